//! Natural-language intent recognition
//!
//! Free text is matched against an ordered catalogue of recognizers. The first
//! recognizer whose pattern matches produces the [`Intent`]; later entries are
//! never consulted, so catalogue order is precedence.

use gcpflow_cloud::model::DEFAULT_MACHINE_TYPE;
use gcpflow_cloud::{CloudError, Labels, Location, Metadata, Result};
use regex::{Captures, Regex};
use serde::Serialize;

/// Structured command derived from free text or from an explicit call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    List {
        location: Location,
    },
    Get {
        name: String,
        location: Location,
    },
    Create {
        name: String,
        location: Location,
        machine_type: String,
        labels: Labels,
        metadata: Metadata,
    },
    Delete {
        name: String,
        location: Location,
    },
    /// Labels / metadata are deltas merged onto the current values
    Modify {
        name: String,
        location: Location,
        labels: Labels,
        metadata: Metadata,
    },
    Start {
        name: String,
        location: Location,
    },
    Stop {
        name: String,
        location: Location,
    },
    Restart {
        name: String,
        location: Location,
    },
    Unrecognized {
        text: String,
    },
}

impl Intent {
    /// Short name of the intent kind
    pub fn kind(&self) -> &'static str {
        match self {
            Intent::List { .. } => "list",
            Intent::Get { .. } => "get",
            Intent::Create { .. } => "create",
            Intent::Delete { .. } => "delete",
            Intent::Modify { .. } => "modify",
            Intent::Start { .. } => "start",
            Intent::Stop { .. } => "stop",
            Intent::Restart { .. } => "restart",
            Intent::Unrecognized { .. } => "unrecognized",
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Intent::Unrecognized { .. })
    }
}

type Extractor = fn(&Captures<'_>, &str, &ParseContext<'_>) -> Intent;

struct Recognizer {
    name: &'static str,
    pattern: Regex,
    extract: Extractor,
}

/// Sub-patterns used for best-effort parameter extraction
struct Fragments {
    machine_type: Regex,
    in_zone: Regex,
    create_label: Regex,
    modify_label: Regex,
    modify_metadata: Regex,
}

struct ParseContext<'a> {
    default_location: &'a Location,
    fragments: &'a Fragments,
}

impl ParseContext<'_> {
    /// Explicit location from a capture group, or the default
    fn location(&self, caps: &Captures<'_>, group: usize) -> Location {
        caps.get(group)
            .map(|m| Location::resolve(m.as_str()))
            .unwrap_or_else(|| self.default_location.clone())
    }

    /// `in zone Z` anywhere in the text, or the default
    fn zone_in(&self, text: &str) -> Location {
        self.fragments
            .in_zone
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| Location::resolve(m.as_str()))
            .unwrap_or_else(|| self.default_location.clone())
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| CloudError::InvalidConfig(format!("invalid intent pattern: {}", e)))
}

fn recognizer(name: &'static str, pattern: &str, extract: Extractor) -> Result<Recognizer> {
    Ok(Recognizer {
        name,
        pattern: compile(pattern)?,
        extract,
    })
}

fn pairs(re: &Regex, text: &str) -> Labels {
    re.captures_iter(text)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect()
}

fn name(caps: &Captures<'_>, group: usize) -> String {
    caps.get(group)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

fn extract_list(caps: &Captures<'_>, _text: &str, ctx: &ParseContext<'_>) -> Intent {
    Intent::List {
        location: ctx.location(caps, 1),
    }
}

fn extract_get(caps: &Captures<'_>, _text: &str, ctx: &ParseContext<'_>) -> Intent {
    Intent::Get {
        name: name(caps, 1),
        location: ctx.location(caps, 2),
    }
}

fn extract_create(caps: &Captures<'_>, text: &str, ctx: &ParseContext<'_>) -> Intent {
    let machine_type = ctx
        .fragments
        .machine_type
        .captures(text)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| DEFAULT_MACHINE_TYPE.to_string());

    Intent::Create {
        name: name(caps, 1),
        location: ctx.zone_in(text),
        machine_type,
        labels: pairs(&ctx.fragments.create_label, text),
        metadata: Metadata::new(),
    }
}

fn extract_delete(caps: &Captures<'_>, _text: &str, ctx: &ParseContext<'_>) -> Intent {
    Intent::Delete {
        name: name(caps, 1),
        location: ctx.location(caps, 2),
    }
}

fn extract_modify(caps: &Captures<'_>, text: &str, ctx: &ParseContext<'_>) -> Intent {
    Intent::Modify {
        name: name(caps, 1),
        location: ctx.zone_in(text),
        labels: pairs(&ctx.fragments.modify_label, text),
        metadata: pairs(&ctx.fragments.modify_metadata, text),
    }
}

// set metadata k=v on vm N
fn extract_set_metadata(caps: &Captures<'_>, text: &str, ctx: &ParseContext<'_>) -> Intent {
    Intent::Modify {
        name: name(caps, 3),
        location: ctx.zone_in(text),
        labels: Labels::new(),
        metadata: Metadata::from([(caps[1].to_string(), caps[2].to_string())]),
    }
}

// set labels for vm N to k=v,k2=v2
fn extract_set_labels(caps: &Captures<'_>, text: &str, ctx: &ParseContext<'_>) -> Intent {
    let labels = caps[2]
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    Intent::Modify {
        name: name(caps, 1),
        location: ctx.zone_in(text),
        labels,
        metadata: Metadata::new(),
    }
}

fn extract_power(caps: &Captures<'_>, _text: &str, ctx: &ParseContext<'_>) -> Intent {
    let name = name(caps, 2);
    let location = ctx.location(caps, 3);
    match caps[1].to_ascii_lowercase().as_str() {
        "start" => Intent::Start { name, location },
        "stop" => Intent::Stop { name, location },
        _ => Intent::Restart { name, location },
    }
}

/// Ordered recognizer catalogue over free text
pub struct IntentParser {
    default_location: Location,
    recognizers: Vec<Recognizer>,
    fragments: Fragments,
}

impl IntentParser {
    /// Build the catalogue. `default_location` is used whenever the text names none.
    pub fn new(default_location: Location) -> Result<Self> {
        let recognizers = vec![
            recognizer(
                "list",
                r"(?i)list\s+(?:all\s+)?instances(?:\s+in\s+([a-z0-9\-]+))?",
                extract_list,
            )?,
            recognizer(
                "list",
                r"(?i)show\s+(?:all\s+)?(?:instances|vms)(?:\s+in\s+([a-z0-9\-]+))?",
                extract_list,
            )?,
            recognizer(
                "list",
                r"(?i)get\s+(?:all\s+)?(?:instances|vms)(?:\s+in\s+([a-z0-9\-]+))?",
                extract_list,
            )?,
            recognizer(
                "get",
                r"(?i)get\s+instance\s+([a-zA-Z0-9\-]+)(?:\s+in\s+([a-z0-9\-]+))?",
                extract_get,
            )?,
            recognizer(
                "get",
                r"(?i)show\s+details\s+for\s+(?:instance|vm)\s+([a-zA-Z0-9\-]+)(?:\s+in\s+([a-z0-9\-]+))?",
                extract_get,
            )?,
            recognizer(
                "get",
                r"(?i)describe\s+(?:instance|vm)\s+([a-zA-Z0-9\-]+)(?:\s+in\s+([a-z0-9\-]+))?",
                extract_get,
            )?,
            recognizer(
                "create",
                r"(?i)(?:create|launch)\s+(?:a\s+)?(?:new\s+)?(?:instance|vm)\s+([a-zA-Z0-9\-]+)",
                extract_create,
            )?,
            recognizer(
                "delete",
                r"(?i)delete\s+instance\s+([a-zA-Z0-9\-]+)(?:\s+in\s+([a-z0-9\-]+))?",
                extract_delete,
            )?,
            recognizer(
                "delete",
                r"(?i)remove\s+(?:instance|vm)\s+([a-zA-Z0-9\-]+)(?:\s+in\s+([a-z0-9\-]+))?",
                extract_delete,
            )?,
            recognizer(
                "delete",
                r"(?i)terminate\s+instance\s+([a-zA-Z0-9\-]+)(?:\s+in\s+([a-z0-9\-]+))?",
                extract_delete,
            )?,
            recognizer(
                "modify",
                r"(?i)(?:update|modify|change)\s+(?:instance|vm)\s+([a-zA-Z0-9\-]+)",
                extract_modify,
            )?,
            recognizer(
                "modify",
                r"(?i)set\s+metadata\s+([a-zA-Z0-9\-]+)=([a-zA-Z0-9\-]+)\s+on\s+(?:instance|vm)\s+([a-zA-Z0-9\-]+)",
                extract_set_metadata,
            )?,
            recognizer(
                "modify",
                r"(?i)set\s+labels?\s+for\s+(?:instance|vm)\s+([a-zA-Z0-9\-]+)\s+to\s+([a-zA-Z0-9\-,=]+)",
                extract_set_labels,
            )?,
            recognizer(
                "power",
                r"(?i)(start|stop|restart)\s+(?:instance|vm)\s+([a-zA-Z0-9\-]+)(?:\s+in\s+([a-z0-9\-]+))?",
                extract_power,
            )?,
        ];

        let fragments = Fragments {
            machine_type: compile(r"(?i)(?:with\s+)?machine\s+type\s+([a-zA-Z0-9\-]+)")?,
            in_zone: compile(r"(?i)in\s+zone\s+([a-z0-9\-]+)")?,
            create_label: compile(r"(?i)with\s+label\s+([a-zA-Z0-9\-]+)=([a-zA-Z0-9\-]+)")?,
            modify_label: compile(r"(?i)with\s+labels?\s+([a-zA-Z0-9\-]+)=([a-zA-Z0-9\-]+)")?,
            modify_metadata: compile(
                r"(?i)with\s+metadata\s+([a-zA-Z0-9\-]+)=([a-zA-Z0-9\-]+)",
            )?,
        };

        Ok(Self {
            default_location,
            recognizers,
            fragments,
        })
    }

    pub fn default_location(&self) -> &Location {
        &self.default_location
    }

    /// Recognizer names in precedence order
    pub fn recognizer_names(&self) -> Vec<&'static str> {
        self.recognizers.iter().map(|r| r.name).collect()
    }

    /// Map free text to an intent. Never fails; unmatched text is `Unrecognized`.
    pub fn parse(&self, text: &str) -> Intent {
        let ctx = ParseContext {
            default_location: &self.default_location,
            fragments: &self.fragments,
        };

        for recognizer in &self.recognizers {
            if let Some(caps) = recognizer.pattern.captures(text) {
                let intent = (recognizer.extract)(&caps, text, &ctx);
                tracing::debug!(
                    recognizer = recognizer.name,
                    intent = intent.kind(),
                    "intent recognized"
                );
                return intent;
            }
        }

        tracing::debug!("no recognizer matched: {:?}", text);
        Intent::Unrecognized {
            text: text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> IntentParser {
        IntentParser::new(Location::resolve("us-central1-a")).unwrap()
    }

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_list_uses_default_location() {
        assert_eq!(
            parser().parse("List all instances"),
            Intent::List {
                location: Location::resolve("us-central1-a")
            }
        );
    }

    #[test]
    fn test_list_phrasings() {
        let p = parser();
        for text in [
            "list instances in europe-west4-b",
            "Show all VMs in europe-west4-b",
            "get vms in europe-west4-b",
        ] {
            assert_eq!(
                p.parse(text),
                Intent::List {
                    location: Location::resolve("europe-west4-b")
                },
                "{text}"
            );
        }
    }

    #[test]
    fn test_get_with_location() {
        assert_eq!(
            parser().parse("Get instance web-1 in us-central1-a"),
            Intent::Get {
                name: "web-1".to_string(),
                location: Location::resolve("us-central1-a"),
            }
        );
    }

    #[test]
    fn test_get_phrasings() {
        let p = parser();
        assert!(matches!(
            p.parse("Show details for vm db-2"),
            Intent::Get { name, .. } if name == "db-2"
        ));
        assert!(matches!(
            p.parse("describe instance db-3 in asia-east1-b"),
            Intent::Get { name, location } if name == "db-3" && location.as_str() == "asia-east1-b"
        ));
    }

    #[test]
    fn test_create_extracts_parameters() {
        let intent = parser().parse(
            "Create a new instance api-1 with machine type e2-medium in zone us-east1-b with label env=prod with label team=core",
        );
        assert_eq!(
            intent,
            Intent::Create {
                name: "api-1".to_string(),
                location: Location::resolve("us-east1-b"),
                machine_type: "e2-medium".to_string(),
                labels: labels(&[("env", "prod"), ("team", "core")]),
                metadata: Metadata::new(),
            }
        );
    }

    #[test]
    fn test_label_keys_exclude_underscore() {
        match parser().parse("create instance api-2 with label env_type=prod") {
            Intent::Create { name, labels, .. } => {
                assert_eq!(name, "api-2");
                assert!(labels.is_empty(), "{:?}", labels);
            }
            other => panic!("unexpected intent: {:?}", other),
        }
    }

    #[test]
    fn test_create_defaults() {
        match parser().parse("launch vm batch-7") {
            Intent::Create {
                machine_type,
                location,
                labels,
                ..
            } => {
                assert_eq!(machine_type, DEFAULT_MACHINE_TYPE);
                assert_eq!(location.as_str(), "us-central1-a");
                assert!(labels.is_empty());
            }
            other => panic!("unexpected intent: {:?}", other),
        }
    }

    #[test]
    fn test_delete_phrasings() {
        let p = parser();
        for text in [
            "delete instance old-1",
            "Remove VM old-1",
            "terminate instance old-1",
        ] {
            assert!(
                matches!(p.parse(text), Intent::Delete { ref name, .. } if name == "old-1"),
                "{text}"
            );
        }
    }

    #[test]
    fn test_modify_keyword_form() {
        assert_eq!(
            parser().parse("Update instance web-1 with labels env=dev with metadata owner=ops"),
            Intent::Modify {
                name: "web-1".to_string(),
                location: Location::resolve("us-central1-a"),
                labels: labels(&[("env", "dev")]),
                metadata: labels(&[("owner", "ops")]),
            }
        );
    }

    #[test]
    fn test_modify_set_metadata_form() {
        assert_eq!(
            parser().parse("set metadata startup=on on vm web-2"),
            Intent::Modify {
                name: "web-2".to_string(),
                location: Location::resolve("us-central1-a"),
                labels: Labels::new(),
                metadata: labels(&[("startup", "on")]),
            }
        );
    }

    #[test]
    fn test_modify_set_labels_form() {
        assert_eq!(
            parser().parse("Set labels for instance web-3 to env=prod,tier=web"),
            Intent::Modify {
                name: "web-3".to_string(),
                location: Location::resolve("us-central1-a"),
                labels: labels(&[("env", "prod"), ("tier", "web")]),
                metadata: Metadata::new(),
            }
        );
    }

    #[test]
    fn test_power_actions() {
        let p = parser();
        assert!(matches!(p.parse("start instance a-1"), Intent::Start { .. }));
        assert!(matches!(p.parse("Stop VM a-1 in us-west1-b"), Intent::Stop { location, .. } if location.as_str() == "us-west1-b"));
        assert!(matches!(p.parse("Restart instance web-1"), Intent::Restart { name, .. } if name == "web-1"));
    }

    #[test]
    fn test_first_match_wins() {
        // Matches both the get-instance and the start recognizer; get comes first.
        let intent = parser().parse("get instance web-1 then start instance web-2");
        assert!(matches!(intent, Intent::Get { name, .. } if name == "web-1"));
    }

    #[test]
    fn test_unrecognized() {
        assert_eq!(
            parser().parse("quux"),
            Intent::Unrecognized {
                text: "quux".to_string()
            }
        );
    }

    #[test]
    fn test_parse_is_deterministic() {
        let p = parser();
        let text = "Create instance web-9 with label env=qa";
        assert_eq!(p.parse(text), p.parse(text));
    }

    #[test]
    fn test_catalogue_order() {
        let names = parser().recognizer_names();
        let first = |n: &str| names.iter().position(|x| *x == n).unwrap();
        assert!(first("list") < first("get"));
        assert!(first("get") < first("create"));
        assert!(first("create") < first("delete"));
        assert!(first("delete") < first("modify"));
        assert!(first("modify") < first("power"));
    }
}

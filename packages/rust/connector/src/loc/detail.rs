//! Parsing of id.loc.gov JSON-LD detail records (expanded form).

use std::collections::HashMap;

use serde_json::{Map, Value};

use reconcile_shared::{
    AgentRef, BF_NS, BFLC_NS, CandidateRecord, Contributor, Note, ReconcileError, Result,
};

const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";
const MADS_AUTHORITATIVE_LABEL: &str = "http://www.loc.gov/mads/rdf/v1#authoritativeLabel";
const MADS_VARIANT_LABEL: &str = "http://www.loc.gov/mads/rdf/v1#variantLabel";

type Node = Map<String, Value>;

/// Nodes of a JSON-LD document indexed by `@id`.
struct Graph<'a> {
    nodes: Vec<&'a Node>,
    by_id: HashMap<&'a str, &'a Node>,
}

impl<'a> Graph<'a> {
    fn new(root: &'a Value) -> Result<Self> {
        let nodes: Vec<&Node> = match root {
            Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
            Value::Object(obj) => match obj.get("@graph") {
                Some(Value::Array(items)) => items.iter().filter_map(Value::as_object).collect(),
                _ => vec![obj],
            },
            _ => return Err(ReconcileError::parse("JSON-LD root is not an object or array")),
        };

        let by_id = nodes
            .iter()
            .copied()
            .filter_map(|n| n.get("@id").and_then(Value::as_str).map(|id| (id, n)))
            .collect();

        Ok(Self { nodes, by_id })
    }

    fn node(&self, id: &str) -> Option<&'a Node> {
        self.by_id.get(id).copied()
    }

    /// Objects of `prop` on `node`, dereferencing `{"@id": ..}` links that
    /// point at nodes in this graph.
    fn objects(&self, node: &'a Node, prop: &str) -> Vec<&'a Node> {
        entries(node, prop)
            .filter_map(Value::as_object)
            .filter(|o| !o.contains_key("@value"))
            .map(|o| {
                let is_ref = o.len() == 1 && o.contains_key("@id");
                match o.get("@id").and_then(Value::as_str) {
                    Some(id) if is_ref => self.node(id).unwrap_or(o),
                    _ => o,
                }
            })
            .collect()
    }
}

fn entries<'a>(node: &'a Node, prop: &str) -> impl Iterator<Item = &'a Value> {
    let items: &'a [Value] = match node.get(prop) {
        Some(Value::Array(items)) => items,
        Some(v) => std::slice::from_ref(v),
        None => &[],
    };
    items.iter()
}

/// Literal values of `prop`.
fn literals<'a>(node: &'a Node, prop: &str) -> impl Iterator<Item = &'a str> {
    entries(node, prop).filter_map(|v| match v {
        Value::String(s) => Some(s.as_str()),
        Value::Object(o) => o.get("@value").and_then(Value::as_str),
        _ => None,
    })
}

/// Non-blank `@id` references of `prop`.
fn refs<'a>(node: &'a Node, prop: &str) -> impl Iterator<Item = &'a str> {
    entries(node, prop)
        .filter_map(|v| v.get("@id").and_then(Value::as_str))
        .filter(|id| !id.starts_with("_:"))
}

fn types(node: &Node) -> Vec<&str> {
    entries(node, "@type").filter_map(Value::as_str).collect()
}

fn label_of(node: &Node) -> Option<String> {
    literals(node, MADS_AUTHORITATIVE_LABEL)
        .chain(literals(node, RDFS_LABEL))
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

fn bf(term: &str) -> String {
    format!("{BF_NS}{term}")
}

/// Local part of a property IRI (`.../bibframe/noteType` -> `noteType`).
fn local_name(iri: &str) -> &str {
    iri.rsplit(['#', '/']).next().unwrap_or(iri)
}

fn parse_json(json: &str) -> Result<Value> {
    serde_json::from_str(json).map_err(|e| ReconcileError::parse(format!("invalid JSON-LD: {e}")))
}

// ---------------------------------------------------------------------------
// Work / Hub records
// ---------------------------------------------------------------------------

/// Parse the detail record of a Work or Hub into a [`CandidateRecord`].
pub fn parse_record(uri: &str, json: &str) -> Result<CandidateRecord> {
    let root = parse_json(json)?;
    let graph = Graph::new(&root)?;
    let subject = find_subject(&graph, uri)
        .ok_or_else(|| ReconcileError::parse(format!("no node for {uri} in detail record")))?;

    let mut record = CandidateRecord::new(uri);

    for label in literals(subject, MADS_AUTHORITATIVE_LABEL).chain(literals(subject, RDFS_LABEL)) {
        record.push_title(label);
    }
    for title in graph.objects(subject, &bf("title")) {
        for main in literals(title, &bf("mainTitle")) {
            record.push_title(main);
        }
    }
    for variant in literals(subject, MADS_VARIANT_LABEL) {
        record.push_title(variant);
    }

    record
        .languages
        .extend(refs(subject, &bf("language")).map(str::to_string));

    for contribution in graph.objects(subject, &bf("contribution")) {
        if let Some(c) = parse_contribution(&graph, contribution) {
            record.contributions.push(c);
        }
    }

    for note in graph.objects(subject, &bf("note")) {
        let note = parse_note(note);
        if !note.is_empty() {
            record.notes.push(note);
        }
    }

    record.hub_links = refs(subject, &bf("expressionOf")).map(str::to_string).collect();
    record.expressed_works = refs(subject, &bf("hasExpression"))
        .map(str::to_string)
        .collect();

    Ok(record)
}

/// The node describing `uri`, accepting either URI scheme.
fn find_subject<'a>(graph: &Graph<'a>, uri: &str) -> Option<&'a Node> {
    if let Some(node) = graph.node(uri) {
        return Some(node);
    }
    let alternate = if let Some(rest) = uri.strip_prefix("http://") {
        format!("https://{rest}")
    } else if let Some(rest) = uri.strip_prefix("https://") {
        format!("http://{rest}")
    } else {
        return None;
    };
    graph.node(&alternate)
}

fn parse_contribution(graph: &Graph<'_>, node: &Node) -> Option<Contributor> {
    let node_types = types(node);
    let primary = format!("{BFLC_NS}PrimaryContribution");
    let type_uri = if node_types.iter().any(|t| *t == primary) {
        primary
    } else {
        bf("Contribution")
    };

    let agent = graph.objects(node, &bf("agent")).into_iter().next()?;
    let label = label_of(agent);
    let agent = match agent.get("@id").and_then(Value::as_str) {
        Some(id) if !id.starts_with("_:") => AgentRef::Link {
            uri: id.to_string(),
            label,
        },
        _ => AgentRef::Label { label: label? },
    };

    Some(Contributor { type_uri, agent })
}

fn parse_note(node: &Node) -> Note {
    let mut note = Note::new();
    for (prop, _) in node.iter().filter(|(k, _)| !k.starts_with('@')) {
        let value = literals(node, prop)
            .next()
            .or_else(|| entries(node, prop).find_map(|v| v.get("@id").and_then(Value::as_str)));
        if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
            note.insert(local_name(prop).to_string(), value.to_string());
        }
    }
    note
}

// ---------------------------------------------------------------------------
// Agent records
// ---------------------------------------------------------------------------

/// Display label of the agent described at `uri`, if the record has one.
pub fn parse_agent_label(uri: &str, json: &str) -> Result<Option<String>> {
    let root = parse_json(json)?;
    let graph = Graph::new(&root)?;

    if let Some(label) = find_subject(&graph, uri).and_then(label_of) {
        return Ok(Some(label));
    }
    // Real-world-object URIs describe the agent through the linked authority
    Ok(graph
        .nodes
        .iter()
        .copied()
        .find_map(|n| literals(n, MADS_AUTHORITATIVE_LABEL).next())
        .map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORK: &str = r#"[
      {
        "@id": "http://id.loc.gov/resources/works/1234",
        "@type": ["http://id.loc.gov/ontologies/bibframe/Work", "http://id.loc.gov/ontologies/bibframe/Text"],
        "http://www.loc.gov/mads/rdf/v1#authoritativeLabel": [{"@value": "Melville, Herman, 1819-1891. Moby Dick"}],
        "http://id.loc.gov/ontologies/bibframe/title": [{"@id": "_:t1"}],
        "http://id.loc.gov/ontologies/bibframe/language": [{"@id": "http://id.loc.gov/vocabulary/languages/eng"}],
        "http://id.loc.gov/ontologies/bibframe/contribution": [{"@id": "_:c1"}, {"@id": "_:c2"}],
        "http://id.loc.gov/ontologies/bibframe/note": [{"@id": "_:n1"}],
        "http://id.loc.gov/ontologies/bibframe/expressionOf": [{"@id": "http://id.loc.gov/resources/hubs/abcd"}]
      },
      {
        "@id": "_:t1",
        "@type": ["http://id.loc.gov/ontologies/bibframe/Title"],
        "http://id.loc.gov/ontologies/bibframe/mainTitle": [{"@value": "Moby Dick", "@language": "en"}]
      },
      {
        "@id": "_:c1",
        "@type": ["http://id.loc.gov/ontologies/bibframe/Contribution", "http://id.loc.gov/ontologies/bflc/PrimaryContribution"],
        "http://id.loc.gov/ontologies/bibframe/agent": [{"@id": "http://id.loc.gov/rwo/agents/n79006936"}]
      },
      {
        "@id": "_:c2",
        "@type": ["http://id.loc.gov/ontologies/bibframe/Contribution"],
        "http://id.loc.gov/ontologies/bibframe/agent": [{"@id": "_:a2"}]
      },
      {
        "@id": "_:a2",
        "http://www.w3.org/2000/01/rdf-schema#label": [{"@value": "Kent, Rockwell"}]
      },
      {
        "@id": "_:n1",
        "@type": ["http://id.loc.gov/ontologies/bibframe/Note"],
        "http://www.w3.org/2000/01/rdf-schema#label": [{"@value": "Translation of: Moby Dick"}],
        "http://id.loc.gov/ontologies/bibframe/noteType": [{"@value": "language"}]
      }
    ]"#;

    #[test]
    fn parses_work_record() {
        let record = parse_record("http://id.loc.gov/resources/works/1234", WORK).unwrap();

        assert_eq!(
            record.titles,
            vec!["Melville, Herman, 1819-1891. Moby Dick", "Moby Dick"]
        );
        assert!(
            record
                .languages
                .contains("http://id.loc.gov/vocabulary/languages/eng")
        );
        assert_eq!(record.hub_links, vec!["http://id.loc.gov/resources/hubs/abcd"]);

        assert_eq!(record.contributions.len(), 2);
        assert_eq!(
            record.contributions[0].type_uri,
            "http://id.loc.gov/ontologies/bflc/PrimaryContribution"
        );
        assert_eq!(
            record.contributions[0].agent,
            AgentRef::Link {
                uri: "http://id.loc.gov/rwo/agents/n79006936".into(),
                label: None,
            }
        );
        assert_eq!(
            record.contributions[1].agent,
            AgentRef::Label {
                label: "Kent, Rockwell".into()
            }
        );

        let note = &record.notes[0];
        assert_eq!(note.get("label").map(String::as_str), Some("Translation of: Moby Dick"));
        assert_eq!(note.get("noteType").map(String::as_str), Some("language"));
    }

    #[test]
    fn hub_record_lists_expressions() {
        let json = r#"{"@graph": [{
            "@id": "https://id.loc.gov/resources/hubs/abcd",
            "http://www.loc.gov/mads/rdf/v1#authoritativeLabel": "Melville, Herman, 1819-1891. Moby Dick",
            "http://id.loc.gov/ontologies/bibframe/hasExpression": [{"@id": "http://id.loc.gov/resources/works/1234"}]
        }]}"#;
        let record = parse_record("http://id.loc.gov/resources/hubs/abcd", json).unwrap();
        assert_eq!(record.uri, "http://id.loc.gov/resources/hubs/abcd");
        assert_eq!(
            record.expressed_works,
            vec!["http://id.loc.gov/resources/works/1234"]
        );
        assert_eq!(record.titles.len(), 1);
    }

    #[test]
    fn missing_subject_is_parse_error() {
        let err = parse_record("http://id.loc.gov/resources/works/9", WORK).unwrap_err();
        assert!(matches!(err, ReconcileError::Parse { .. }));
        assert!(parse_record("http://id.loc.gov/resources/works/9", "not json").is_err());
    }

    #[test]
    fn agent_label_from_subject_or_authority() {
        let direct = r#"[{
            "@id": "http://id.loc.gov/rwo/agents/n79006936",
            "http://www.w3.org/2000/01/rdf-schema#label": [{"@value": "Melville, Herman, 1819-1891"}]
        }]"#;
        assert_eq!(
            parse_agent_label("http://id.loc.gov/rwo/agents/n79006936", direct).unwrap(),
            Some("Melville, Herman, 1819-1891".into())
        );

        let via_authority = r#"[{
            "@id": "http://id.loc.gov/authorities/names/n79006936",
            "http://www.loc.gov/mads/rdf/v1#authoritativeLabel": [{"@value": "Melville, Herman, 1819-1891"}]
        }]"#;
        assert_eq!(
            parse_agent_label("http://id.loc.gov/rwo/agents/n79006936", via_authority).unwrap(),
            Some("Melville, Herman, 1819-1891".into())
        );

        assert_eq!(
            parse_agent_label("http://id.loc.gov/rwo/agents/x", "[]").unwrap(),
            None
        );
    }
}

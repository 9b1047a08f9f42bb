//! Extraction of Work and Instance records from a BIBFRAME RDF/XML document.

use reconcile_shared::{
    AgentRef, BF_NS, BFLC_NS, Contributor, LANGUAGE_VOCAB, LocalWork, Note,
};
use tracing::warn;

use crate::xml::{Document, Element, RDF_NS, RDFS_NS};

/// Qualified names of the BIBFRAME terms read from one document.
struct Names {
    work: String,
    instance: String,
    instance_of: String,
    title: String,
    title_class: String,
    variant_title: String,
    language: String,
    note: String,
    contribution: String,
    primary_contribution: String,
    agent: String,
    code: String,
    rdf_about: String,
    rdf_resource: String,
    rdf_type: String,
    rdfs_label: String,
}

impl Names {
    fn for_document(doc: &Document) -> Self {
        Self {
            work: doc.qname(BF_NS, "Work"),
            instance: doc.qname(BF_NS, "Instance"),
            instance_of: doc.qname(BF_NS, "instanceOf"),
            title: doc.qname(BF_NS, "title"),
            title_class: doc.qname(BF_NS, "Title"),
            variant_title: doc.qname(BF_NS, "VariantTitle"),
            language: doc.qname(BF_NS, "language"),
            note: doc.qname(BF_NS, "note"),
            contribution: doc.qname(BF_NS, "contribution"),
            primary_contribution: doc.qname(BFLC_NS, "PrimaryContribution"),
            agent: doc.qname(BF_NS, "agent"),
            code: doc.qname(BF_NS, "code"),
            rdf_about: doc.qname(RDF_NS, "about"),
            rdf_resource: doc.qname(RDF_NS, "resource"),
            rdf_type: doc.qname(RDF_NS, "type"),
            rdfs_label: doc.qname(RDFS_NS, "label"),
        }
    }
}

/// Every top-level `bf:Work` with an `rdf:about`, in document order.
pub fn extract_works(doc: &Document) -> Vec<LocalWork> {
    let names = Names::for_document(doc);
    let mut works = Vec::new();

    for element in doc.root.children_named(&names.work) {
        let Some(id) = element.attr(&names.rdf_about) else {
            warn!("skipping Work without rdf:about");
            continue;
        };
        works.push(parse_work(&names, id, element));
    }
    works
}

/// `rdf:about` of every top-level Instance whose `bf:instanceOf` points at `work_id`.
pub fn instances_of<'a>(doc: &'a Document, work_id: &str) -> Vec<&'a str> {
    let names = Names::for_document(doc);
    doc.root
        .children_named(&names.instance)
        .filter(|instance| {
            instance
                .children_named(&names.instance_of)
                .any(|link| link.attr(&names.rdf_resource) == Some(work_id))
        })
        .filter_map(|instance| instance.attr(&names.rdf_about))
        .collect()
}

fn parse_work(names: &Names, id: &str, element: &Element) -> LocalWork {
    let mut work = LocalWork {
        id: id.to_string(),
        ..LocalWork::default()
    };

    let mut primary: Vec<String> = Vec::new();
    let mut variants: Vec<String> = Vec::new();
    for title in element
        .children_named(&names.title)
        .flat_map(|t| t.elements())
    {
        let text = title_text(title);
        if text.is_empty() {
            continue;
        }
        if title.name == names.title_class {
            primary.push(text);
        } else if title.name == names.variant_title {
            variants.push(text);
        }
    }
    work.titles = primary.into_iter().chain(variants).collect();

    work.types = element
        .children_named(&names.rdf_type)
        .filter_map(|t| t.attr(&names.rdf_resource))
        .map(str::to_string)
        .collect();

    for language in element.children_named(&names.language) {
        if let Some(uri) = language_uri(names, language) {
            work.languages.insert(uri);
        }
    }

    for note in element
        .children_named(&names.note)
        .flat_map(|n| n.elements())
    {
        let note = parse_note(names, note);
        if !note.is_empty() {
            work.notes.push(note);
        }
    }

    for contribution in element
        .children_named(&names.contribution)
        .flat_map(|c| c.elements())
    {
        if let Some(c) = parse_contribution(names, contribution) {
            work.contributors.push(c);
        }
    }

    work
}

/// Non-blank text segments under a title node joined with single spaces.
fn title_text(title: &Element) -> String {
    title
        .texts()
        .into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn language_uri(names: &Names, language: &Element) -> Option<String> {
    let value = language
        .attr(&names.rdf_resource)
        .map(str::to_string)
        .or_else(|| {
            let inner = language.elements().next()?;
            inner
                .attr(&names.rdf_about)
                .map(str::to_string)
                .or_else(|| inner.child(&names.code).map(|c| c.texts().concat()))
        })
        .or_else(|| Some(language.texts().concat()))?;

    let value = value.trim();
    if value.is_empty() {
        None
    } else if value.contains(':') {
        Some(value.to_string())
    } else {
        Some(format!("{LANGUAGE_VOCAB}{value}"))
    }
}

fn parse_note(names: &Names, note: &Element) -> Note {
    let mut fields = Note::new();
    for field in note.elements().filter(|f| f.name != names.rdf_type) {
        let value = match field.attr(&names.rdf_resource) {
            Some(uri) => uri.to_string(),
            None => field.texts().concat().trim().to_string(),
        };
        if !value.is_empty() {
            fields.insert(field.local_name().to_string(), value);
        }
    }
    fields
}

fn parse_contribution(names: &Names, contribution: &Element) -> Option<Contributor> {
    let primary = contribution.name == names.primary_contribution
        || contribution.children_named(&names.rdf_type).any(|t| {
            t.attr(&names.rdf_resource)
                .is_some_and(|r| r == format!("{BFLC_NS}PrimaryContribution"))
        });
    let type_uri = if primary {
        format!("{BFLC_NS}PrimaryContribution")
    } else {
        format!("{BF_NS}Contribution")
    };

    let agent = contribution.child(&names.agent)?;
    let agent = match agent.attr(&names.rdf_resource) {
        Some(uri) => AgentRef::Link {
            uri: uri.to_string(),
            label: None,
        },
        None => {
            let node = agent.elements().next()?;
            let label = node
                .child(&names.rdfs_label)
                .map(|l| l.texts().concat().trim().to_string())
                .filter(|l| !l.is_empty());
            match node.attr(&names.rdf_about) {
                Some(uri) => AgentRef::Link {
                    uri: uri.to_string(),
                    label,
                },
                None => AgentRef::Label { label: label? },
            }
        }
    };

    Some(Contributor { type_uri, agent })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = include_str!("../../../../fixtures/rdf/works.xml");

    #[test]
    fn extracts_work_fields() {
        let doc = Document::parse(FIXTURE).unwrap();
        let works = extract_works(&doc);
        assert_eq!(works.len(), 2);

        let w1 = &works[0];
        assert_eq!(w1.id, "http://example.org/works/w1");
        assert_eq!(w1.titles, vec!["Moby Dick", "The whale"]);
        assert!(w1.types.contains("http://id.loc.gov/ontologies/bibframe/Text"));
        assert!(w1.languages.contains("http://id.loc.gov/vocabulary/languages/eng"));

        assert_eq!(w1.notes.len(), 1);
        assert_eq!(
            w1.notes[0].get("label").map(String::as_str),
            Some("Translation of: Moby Dick")
        );
        assert_eq!(w1.notes[0].get("noteType").map(String::as_str), Some("language"));

        assert_eq!(w1.contributors.len(), 2);
        assert_eq!(
            w1.contributors[0].type_uri,
            "http://id.loc.gov/ontologies/bflc/PrimaryContribution"
        );
        assert_eq!(
            w1.contributors[0].agent.uri(),
            Some("http://id.loc.gov/rwo/agents/n79006936")
        );
        assert_eq!(
            w1.contributors[1].agent,
            AgentRef::Label {
                label: "Kent, Rockwell".into()
            }
        );
    }

    #[test]
    fn finds_instances_of_work() {
        let doc = Document::parse(FIXTURE).unwrap();
        let instances = instances_of(&doc, "http://example.org/works/w1");
        assert_eq!(
            instances,
            vec!["http://example.org/instances/i1", "http://example.org/instances/i2"]
        );
        assert!(instances_of(&doc, "http://id.loc.gov/resources/works/5678").is_empty());
    }

    #[test]
    fn multi_part_titles_and_bare_language_codes() {
        let xml = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns:bf="http://id.loc.gov/ontologies/bibframe/">
  <bf:Work rdf:about="http://example.org/w2">
    <bf:title>
      <bf:Title>
        <bf:mainTitle>Typee</bf:mainTitle>
        <bf:subtitle>a peep at Polynesian life</bf:subtitle>
      </bf:Title>
    </bf:title>
    <bf:language><bf:Language><bf:code>fre</bf:code></bf:Language></bf:language>
  </bf:Work>
  <bf:Work><bf:title><bf:Title><bf:mainTitle>No id</bf:mainTitle></bf:Title></bf:title></bf:Work>
</rdf:RDF>"#;
        let doc = Document::parse(xml).unwrap();
        let works = extract_works(&doc);
        assert_eq!(works.len(), 1);
        assert_eq!(works[0].titles, vec!["Typee a peep at Polynesian life"]);
        assert!(
            works[0]
                .languages
                .contains("http://id.loc.gov/vocabulary/languages/fre")
        );
    }
}

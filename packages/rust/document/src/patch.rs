//! Patch sets: identifier replacements and Hub links applied to a document.
//!
//! Applying a patch never mutates the input; it returns a new document.
//! Applying the same patch twice yields the same document.

use reconcile_shared::BF_NS;
use tracing::debug;

use crate::xml::{Document, Element, Node, RDF_NS};

/// A link between a reconciled Work and the Hub it expresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubLink {
    pub work_uri: String,
    pub hub_uri: String,
}

/// Changes collected while reconciling one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSet {
    replacements: Vec<(String, String)>,
    hub_links: Vec<HubLink>,
}

impl PatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repoint every reference to `placeholder` at `uri`.
    pub fn replace(&mut self, placeholder: impl Into<String>, uri: impl Into<String>) {
        let placeholder = placeholder.into();
        let uri = uri.into();
        if placeholder != uri {
            self.replacements.push((placeholder, uri));
        }
    }

    /// Record that the Work at `work_uri` is an expression of `hub_uri`.
    pub fn link_hub(&mut self, work_uri: impl Into<String>, hub_uri: impl Into<String>) {
        let link = HubLink {
            work_uri: work_uri.into(),
            hub_uri: hub_uri.into(),
        };
        if !self.hub_links.contains(&link) {
            self.hub_links.push(link);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty() && self.hub_links.is_empty()
    }

    pub fn replacements(&self) -> &[(String, String)] {
        &self.replacements
    }

    pub fn hub_links(&self) -> &[HubLink] {
        &self.hub_links
    }

    /// Build the output document from `doc` plus this patch.
    pub fn apply(&self, doc: &Document) -> Document {
        let mut out = doc.clone();
        if self.is_empty() {
            return out;
        }
        out.ensure_namespace(RDF_NS);
        out.ensure_namespace(BF_NS);

        for (placeholder, uri) in &self.replacements {
            let n = out.root.replace_attr_values(placeholder, uri);
            debug!(%placeholder, %uri, references = n, "repointed placeholder");
        }

        let names = LinkNames::for_document(&out);
        for link in &self.hub_links {
            let work_uri = self.resolve(&link.work_uri);
            names.link_work(&mut out.root, work_uri, &link.hub_uri);
            names.link_hub(&mut out.root, &link.hub_uri, work_uri);
        }
        out
    }

    /// Final identifier for `uri` after replacements.
    fn resolve<'a>(&'a self, uri: &'a str) -> &'a str {
        self.replacements
            .iter()
            .find(|(placeholder, _)| placeholder == uri)
            .map_or(uri, |(_, replacement)| replacement.as_str())
    }
}

struct LinkNames {
    work: String,
    expression_of: String,
    has_expression: String,
    hub_class: String,
    rdf_about: String,
    rdf_resource: String,
    rdf_type: String,
}

impl LinkNames {
    fn for_document(doc: &Document) -> Self {
        Self {
            work: doc.qname(BF_NS, "Work"),
            expression_of: doc.qname(BF_NS, "expressionOf"),
            has_expression: doc.qname(BF_NS, "hasExpression"),
            hub_class: format!("{BF_NS}Hub"),
            rdf_about: doc.qname(RDF_NS, "about"),
            rdf_resource: doc.qname(RDF_NS, "resource"),
            rdf_type: doc.qname(RDF_NS, "type"),
        }
    }

    fn link_work(&self, root: &mut Element, work_uri: &str, hub_uri: &str) {
        let Some(work) = root
            .elements_mut()
            .find(|e| e.name == self.work && e.attr(&self.rdf_about) == Some(work_uri))
        else {
            return;
        };
        self.add_link(work, &self.expression_of, hub_uri);
    }

    fn link_hub(&self, root: &mut Element, hub_uri: &str, work_uri: &str) {
        if let Some(hub) = root
            .elements_mut()
            .find(|e| e.attr(&self.rdf_about) == Some(hub_uri))
        {
            self.add_link(hub, &self.has_expression, work_uri);
            return;
        }

        let hub = Element::new(self.work.as_str())
            .with_attr(self.rdf_about.as_str(), hub_uri)
            .with_child(
                Element::new(self.rdf_type.as_str())
                    .with_attr(self.rdf_resource.as_str(), self.hub_class.as_str()),
            )
            .with_child(
                Element::new(self.has_expression.as_str())
                    .with_attr(self.rdf_resource.as_str(), work_uri),
            );
        debug!(%hub_uri, %work_uri, "appending Hub record");
        root.children.push(Node::Element(hub));
    }

    /// Add `<name rdf:resource=target/>` unless an identical link exists.
    fn add_link(&self, element: &mut Element, name: &str, target: &str) {
        let exists = element
            .children_named(name)
            .any(|l| l.attr(&self.rdf_resource) == Some(target));
        if !exists {
            element.children.push(Node::Element(
                Element::new(name).with_attr(self.rdf_resource.as_str(), target),
            ));
        }
    }
}

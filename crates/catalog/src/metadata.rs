use anyhow::{Context, Result};
use oxigraph::io::{RdfFormat, RdfParser};
use oxigraph::model::Term;
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;
use std::collections::BTreeSet;

use crate::book::{BookId, BookMetadata};

/// Base IRI of the catalog's RDF records; `rdf:about` values are relative to it.
pub const GUTENBERG_BASE_IRI: &str = "http://www.gutenberg.org/";

const PREFIXES: &str = "PREFIX dcterms: <http://purl.org/dc/terms/>\n\
    PREFIX pgterms: <http://www.gutenberg.org/2009/pgterms/>\n\
    PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#>\n";

/// Parse the catalog's RDF/XML record for `book_id` into flat metadata.
pub fn parse_metadata(book_id: &BookId, rdf_xml: &str) -> Result<BookMetadata> {
    let store = Store::new().context("Failed to create RDF store")?;
    let parser = RdfParser::from_format(RdfFormat::RdfXml)
        .with_base_iri(GUTENBERG_BASE_IRI)
        .context("Invalid base IRI")?;
    store
        .load_from_reader(parser, rdf_xml.as_bytes())
        .context(format!("Failed to parse RDF record for ebook {}", book_id))?;

    let subject = format!("<{}ebooks/{}>", GUTENBERG_BASE_IRI, book_id);
    let record = RecordQuery {
        store: &store,
        subject: &subject,
    };

    Ok(BookMetadata {
        title: record.first("dcterms:title")?,
        authors: join(record.values("dcterms:creator/pgterms:name")?, " | "),
        publisher: record.first("dcterms:publisher")?,
        issued: record.first("dcterms:issued")?,
        languages: join(record.values("dcterms:language/rdf:value")?, ", "),
        subjects: join(record.values("dcterms:subject/rdf:value")?, ", "),
        rights: record.first("dcterms:rights")?,
    })
}

struct RecordQuery<'a> {
    store: &'a Store,
    subject: &'a str,
}

impl RecordQuery<'_> {
    /// Distinct values reached from the ebook through a SPARQL property path
    #[allow(deprecated)]
    fn values(&self, path: &str) -> Result<BTreeSet<String>> {
        let query = format!(
            "{}SELECT DISTINCT ?value WHERE {{ {} {} ?value }}",
            PREFIXES, self.subject, path
        );
        let results = self
            .store
            .query(query.as_str())
            .context(format!("RDF query failed for {}", path))?;

        let mut values = BTreeSet::new();
        let QueryResults::Solutions(solutions) = results else {
            anyhow::bail!("Unexpected result type for RDF query on {}", path);
        };
        for solution in solutions {
            let solution = solution.context("Failed to read RDF query solution")?;
            if let Some(term) = solution.get("value") {
                let value = term_value(term);
                if !value.trim().is_empty() {
                    values.insert(value.trim().to_string());
                }
            }
        }
        Ok(values)
    }

    fn first(&self, path: &str) -> Result<Option<String>> {
        Ok(self.values(path)?.into_iter().next())
    }
}

fn term_value(term: &Term) -> String {
    match term {
        Term::Literal(literal) => literal.value().to_string(),
        Term::NamedNode(node) => node.as_str().to_string(),
        other => other.to_string(),
    }
}

fn join(values: BTreeSet<String>, separator: &str) -> String {
    values.into_iter().collect::<Vec<_>>().join(separator)
}

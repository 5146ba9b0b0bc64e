//! Category and tag assignment.

use canonical::{normalize_terms, sanitize_text, MappingRules};
use protocol::ContentPayload;
use serde::Serialize;
use tracing::debug;

use crate::config::ReceiverConfig;
use crate::store::{ContentId, ContentStore, Taxonomy, TermId};

/// What happened to the payload's categories and tags.
///
/// Taxonomy problems never fail an ingest; they are reported here instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaxonomyReport {
    pub category_assigned_count: usize,
    pub tag_assigned_count: usize,
    pub category_taxonomy_supported: bool,
    pub tag_taxonomy_supported: bool,
    pub category_taxonomy_error: String,
    pub tag_taxonomy_error: String,
    pub payload_categories: Vec<String>,
    pub normalized_categories: Vec<String>,
    pub category_term_ids: Vec<TermId>,
    pub payload_tags: Vec<String>,
    pub normalized_tags: Vec<String>,
}

/// Assign the payload's categories and tags to `id`.
///
/// Category names go through the configured mapping rules; tag names do not.
/// Missing terms are created only when the matching `auto_create_*` switch
/// is on.
pub(crate) fn apply_taxonomies(
    store: &dyn ContentStore,
    id: ContentId,
    payload: &ContentPayload,
    config: &ReceiverConfig,
) -> TaxonomyReport {
    let mut report = TaxonomyReport::default();
    let post_type = config.post_type.as_str();

    if !payload.categories.is_empty() {
        report.payload_categories = payload.categories.iter().map(|c| sanitize_text(c)).collect();
        let names = normalize_terms(
            &payload.categories,
            &config.mapping_rules(),
            config.tag_normalization,
        );
        report.category_taxonomy_supported = store.supports_taxonomy(post_type, Taxonomy::Category);
        if report.category_taxonomy_supported {
            let ids = resolve_term_ids(store, &names, Taxonomy::Category, config.auto_create_categories);
            match store.set_terms(id, Taxonomy::Category, &ids) {
                Ok(count) => report.category_assigned_count = count,
                Err(err) => report.category_taxonomy_error = err.to_string(),
            }
            report.category_term_ids = ids;
        } else {
            report.category_taxonomy_error = unsupported(Taxonomy::Category, post_type);
        }
        report.normalized_categories = names;
    }

    if !payload.tags.is_empty() {
        report.payload_tags = payload.tags.iter().map(|t| sanitize_text(t)).collect();
        let names = normalize_terms(&payload.tags, &MappingRules::default(), config.tag_normalization);
        report.tag_taxonomy_supported = store.supports_taxonomy(post_type, Taxonomy::Tag);
        if report.tag_taxonomy_supported {
            let ids = resolve_term_ids(store, &names, Taxonomy::Tag, config.auto_create_tags);
            match store.set_terms(id, Taxonomy::Tag, &ids) {
                Ok(count) => report.tag_assigned_count = count,
                Err(err) => report.tag_taxonomy_error = err.to_string(),
            }
        } else {
            report.tag_taxonomy_error = unsupported(Taxonomy::Tag, post_type);
        }
        report.normalized_tags = names;
    }

    report
}

fn unsupported(taxonomy: Taxonomy, post_type: &str) -> String {
    format!(
        "Taxonomy \"{}\" is not registered for post type \"{}\".",
        taxonomy.name(),
        post_type
    )
}

/// Existing term ids for `names`, creating missing ones when allowed.
/// Lookup or creation failures drop the term.
fn resolve_term_ids(
    store: &dyn ContentStore,
    names: &[String],
    taxonomy: Taxonomy,
    allow_create: bool,
) -> Vec<TermId> {
    let mut ids: Vec<TermId> = Vec::with_capacity(names.len());
    for name in names.iter().filter(|n| !n.is_empty()) {
        let found = match store.find_term(taxonomy, name) {
            Ok(Some(id)) => Some(id),
            Ok(None) if allow_create => store.create_term(taxonomy, name).ok(),
            Ok(None) => None,
            Err(err) => {
                debug!(taxonomy = taxonomy.name(), term = %name, error = %err, "term_lookup_failed");
                None
            }
        };
        if let Some(id) = found.filter(|id| *id > 0) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

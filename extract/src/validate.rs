//! Schema validation for merged extraction output (§4.5 step 6). A document
//! claiming a typed class (`project`/`patent`/`research`) without the
//! matching block populated is a validation failure and demotes to `other`.

use crate::extractor::ExtractedFields;
use pipeline_core::types::DocumentClass;

fn project_populated(fields: &ExtractedFields) -> bool {
    fields.project.as_ref().is_some_and(|p| p.name.is_some() || p.summary.is_some())
}

fn patent_populated(fields: &ExtractedFields) -> bool {
    fields.patent.as_ref().is_some_and(|p| p.number.is_some() || p.title.is_some())
}

fn research_populated(fields: &ExtractedFields) -> bool {
    fields.research.as_ref().is_some_and(|r| r.title.is_some() || r.abstract_text.is_some())
}

/// Resolves the final `document_type`. When the LLM declared a class
/// explicitly, the matching block must carry an identifying field or
/// validation fails. When it didn't, the class is inferred from whichever
/// block is populated, falling back to `other`.
pub fn validate(mut fields: ExtractedFields) -> Result<(DocumentClass, ExtractedFields), String> {
    let class = match fields.document_type {
        Some(declared @ DocumentClass::Project) if project_populated(&fields) => declared,
        Some(declared @ DocumentClass::Patent) if patent_populated(&fields) => declared,
        Some(declared @ DocumentClass::Research) if research_populated(&fields) => declared,
        Some(declared @ DocumentClass::Other) => declared,
        Some(declared) => return Err(format!("document_type {declared:?} declared but its nested block carries no identifying field")),
        None if project_populated(&fields) => DocumentClass::Project,
        None if patent_populated(&fields) => DocumentClass::Patent,
        None if research_populated(&fields) => DocumentClass::Research,
        None => DocumentClass::Other,
    };

    fields.project = if class == DocumentClass::Project { fields.project } else { None };
    fields.patent = if class == DocumentClass::Patent { fields.patent } else { None };
    fields.research = if class == DocumentClass::Research { fields.research } else { None };

    Ok((class, fields))
}

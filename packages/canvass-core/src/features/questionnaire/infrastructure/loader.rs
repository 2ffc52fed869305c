//! Questionnaire Loader
//!
//! Schema-validates a YAML document with exactly one top-level
//! `questionnaire` and produces the typed, flattened model.
//!
//! # Schema
//! ```yaml
//! qmlVersion: "1.0"        # optional; unknown majors rejected
//! questionnaire:
//!   title: Survey
//!   codeInit: |            # optional
//!     threshold = 50000
//!   blocks:
//!     - id: main
//!       title: Main
//!       items:
//!         - id: q_age
//!           kind: Question
//!           title: Your age
//!           input: { control: Editbox, min: 0, max: 120 }
//! ```
//!
//! Numeric domains come from `input.min`/`input.max` (Editbox/Slider,
//! defaulting to ±2³¹), enumerations from `labels` (Radio, old form) or
//! `options` (RadioButton, new form), `Checkbox` is boolean, and a question
//! without an `input` block is a free integer.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::{CanvassError, Result};
use crate::features::questionnaire::domain::{
    AnswerDomain, Block, Condition, Item, ItemKind, Questionnaire, DEFAULT_MAX, DEFAULT_MIN,
};

/// Supported schema major version.
const SUPPORTED_MAJOR: &str = "1";

// ---------------------------------------------------------------------------
// Raw document shapes (serde)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QmlDoc {
    #[serde(rename = "qmlVersion")]
    qml_version: Option<String>,
    questionnaire: QuestionnaireDoc,
}

#[derive(Debug, Deserialize)]
struct QuestionnaireDoc {
    title: String,
    #[serde(rename = "codeInit")]
    code_init: Option<String>,
    #[serde(default)]
    blocks: Vec<BlockDoc>,
}

#[derive(Debug, Deserialize)]
struct BlockDoc {
    id: String,
    title: Option<String>,
    #[serde(default)]
    items: Vec<ItemDoc>,
}

#[derive(Debug, Deserialize)]
struct ItemDoc {
    id: String,
    kind: String,
    title: Option<String>,
    input: Option<InputDoc>,
    #[serde(default)]
    precondition: Vec<ConditionDoc>,
    #[serde(default)]
    postcondition: Vec<ConditionDoc>,
    #[serde(rename = "codeBlock")]
    code_block: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InputDoc {
    control: String,
    min: Option<i64>,
    max: Option<i64>,
    #[allow(dead_code)]
    step: Option<i64>,
    /// Radio, old form: value → label
    labels: Option<BTreeMap<i64, String>>,
    /// RadioButton, new form
    options: Option<Vec<OptionDoc>>,
}

#[derive(Debug, Deserialize)]
struct OptionDoc {
    value: i64,
    #[allow(dead_code)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConditionDoc {
    predicate: String,
    hint: Option<String>,
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load a questionnaire from YAML text.
pub fn load_from_str(source: &str) -> Result<Questionnaire> {
    let doc: QmlDoc =
        serde_yaml::from_str(source).map_err(|e| CanvassError::Schema(e.to_string()))?;

    if let Some(version) = &doc.qml_version {
        check_version(version)?;
    }

    let questionnaire = flatten(doc.questionnaire)?;
    info!(
        title = %questionnaire.title,
        blocks = questionnaire.blocks.len(),
        items = questionnaire.items.len(),
        "questionnaire loaded"
    );
    Ok(questionnaire)
}

/// Load a questionnaire from a file path.
pub fn load_from_path(path: &Path) -> Result<Questionnaire> {
    let source = std::fs::read_to_string(path)?;
    load_from_str(&source)
}

fn check_version(version: &str) -> Result<()> {
    let major = version.split('.').next().unwrap_or(version);
    if major != SUPPORTED_MAJOR {
        return Err(CanvassError::Schema(format!(
            "unsupported qmlVersion `{}` (supported major: {})",
            version, SUPPORTED_MAJOR
        )));
    }
    Ok(())
}

/// Flatten the nested block/item structure into file-ordered items.
fn flatten(doc: QuestionnaireDoc) -> Result<Questionnaire> {
    let mut blocks = Vec::with_capacity(doc.blocks.len());
    let mut items = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut origin_index = 0;

    for block in doc.blocks {
        for raw in block.items {
            if !seen.insert(raw.id.clone()) {
                return Err(CanvassError::DuplicateItemId(raw.id));
            }
            items.push(convert_item(raw, origin_index, &block.id)?);
            origin_index += 1;
        }
        blocks.push(Block {
            id: block.id,
            title: block.title,
        });
    }

    if items.is_empty() {
        return Err(CanvassError::EmptyQuestionnaire);
    }

    debug!(items = items.len(), "flattened questionnaire structure");
    Ok(Questionnaire {
        title: doc.title,
        code_init: doc.code_init,
        blocks,
        items,
    })
}

fn convert_item(raw: ItemDoc, origin_index: usize, block_id: &str) -> Result<Item> {
    let kind = match raw.kind.as_str() {
        "Question" => ItemKind::Question,
        "Comment" => ItemKind::Comment,
        "Group" => ItemKind::Group,
        other => {
            return Err(CanvassError::Schema(format!(
                "item `{}`: unknown kind `{}`",
                raw.id, other
            )))
        }
    };

    let domain = match kind {
        ItemKind::Question => Some(convert_domain(&raw.id, raw.input.as_ref())?),
        _ => {
            if raw.input.is_some() {
                return Err(CanvassError::Schema(format!(
                    "item `{}`: `input` is only valid on a Question",
                    raw.id
                )));
            }
            None
        }
    };

    Ok(Item {
        id: raw.id,
        kind,
        title: raw.title,
        domain,
        preconditions: convert_conditions(raw.precondition),
        postconditions: convert_conditions(raw.postcondition),
        code_block: raw.code_block,
        origin_index,
        block_id: block_id.to_string(),
    })
}

fn convert_conditions(raw: Vec<ConditionDoc>) -> Vec<Condition> {
    raw.into_iter()
        .map(|c| Condition {
            predicate: c.predicate,
            hint: c.hint,
        })
        .collect()
}

fn convert_domain(id: &str, input: Option<&InputDoc>) -> Result<AnswerDomain> {
    let input = match input {
        Some(input) => input,
        // No input control: unconstrained integer
        None => return Ok(AnswerDomain::Free),
    };

    match input.control.as_str() {
        "Editbox" | "Slider" => Ok(AnswerDomain::Integer {
            lo: input.min.unwrap_or(DEFAULT_MIN),
            hi: input.max.unwrap_or(DEFAULT_MAX),
        }),
        "Radio" => {
            let labels = input.labels.as_ref().ok_or_else(|| {
                CanvassError::Schema(format!("item `{}`: Radio requires `labels`", id))
            })?;
            Ok(AnswerDomain::Enum(labels.keys().copied().collect()))
        }
        "RadioButton" => {
            let options = input.options.as_ref().ok_or_else(|| {
                CanvassError::Schema(format!("item `{}`: RadioButton requires `options`", id))
            })?;
            Ok(AnswerDomain::Enum(options.iter().map(|o| o.value).collect()))
        }
        "Checkbox" => Ok(AnswerDomain::Boolean),
        other => Err(CanvassError::Schema(format!(
            "item `{}`: unknown control `{}`",
            id, other
        ))),
    }
}

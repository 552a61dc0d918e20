//! Response contract for the reasoning service.
//!
//! Raw responses are untrusted. They are parsed into wire structs, then
//! checked against the layout they refer to before anything downstream sees
//! them. Every failure here is a `TransientFailure` and is retried by the
//! generator under the same budget as transport errors.

use serde::{Deserialize, Serialize};

use crate::error::{SchemaViolation, TransientFailure};
use crate::model::{BoundingBox, Layout, ObjectUpdate, UpdateSet};

/// One validated proposal: what changed, not yet applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedVariation {
    pub name: String,
    pub description: String,
    pub updates: UpdateSet,
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawProposal {
    #[serde(default)]
    variations: Vec<RawVariation>,
}

#[derive(Debug, Deserialize)]
struct RawVariation {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    objects: Vec<RawObjectUpdate>,
}

#[derive(Debug, Deserialize)]
struct RawObjectUpdate {
    id: String,
    #[serde(default)]
    bbox: Option<Vec<f64>>,
    #[serde(default)]
    orientation: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRepair {
    Bare(Vec<RawObjectUpdate>),
    Wrapped { objects: Vec<RawObjectUpdate> },
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Strip Markdown code fences the model may wrap around its JSON.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[start + 3..];
    // skip the language tag line
    let body = match after.find('\n') {
        Some(newline) => &after[newline + 1..],
        None => after,
    };
    match body.rfind("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, TransientFailure> {
    let body = strip_code_fences(raw);
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| TransientFailure::MalformedJson(e.to_string()))?;
    serde_json::from_value(value)
        .map_err(|e| TransientFailure::MalformedJson(format!("unexpected shape: {e}")))
}

fn to_update(raw: &RawObjectUpdate) -> Result<ObjectUpdate, SchemaViolation> {
    let bbox = match raw.bbox.as_deref() {
        None => None,
        Some(&[x, y, w, h]) => {
            let bbox = BoundingBox::new(x, y, w, h);
            if !bbox.is_well_formed() {
                return Err(SchemaViolation::InvalidBox(raw.id.clone()));
            }
            Some(bbox)
        }
        Some(_) => return Err(SchemaViolation::InvalidBox(raw.id.clone())),
    };
    let orientation = match raw.orientation {
        Some(deg) => match crate::model::round_orientation(deg) {
            Some(deg) => Some(deg),
            None => return Err(SchemaViolation::InvalidBox(raw.id.clone())),
        },
        None => None,
    };
    Ok(ObjectUpdate { bbox, orientation })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse and validate a proposal response against `layout`.
pub fn parse_proposals(raw: &str, layout: &Layout) -> Result<Vec<ProposedVariation>, TransientFailure> {
    let proposal: RawProposal = parse_json(raw)?;
    if proposal.variations.is_empty() {
        return Err(SchemaViolation::EmptyVariations.into());
    }

    proposal
        .variations
        .into_iter()
        .map(|variation| -> Result<ProposedVariation, TransientFailure> {
            let name = non_blank(variation.name).ok_or(SchemaViolation::MissingName)?;
            let description =
                non_blank(variation.description).ok_or(SchemaViolation::MissingDescription)?;
            let mut updates = UpdateSet::new();
            for object in &variation.objects {
                if !layout.contains(&object.id) {
                    return Err(SchemaViolation::UnknownObject(object.id.clone()).into());
                }
                let update = to_update(object)?;
                if !update.is_empty() {
                    updates.insert(object.id.clone(), update);
                }
            }
            Ok(ProposedVariation {
                name,
                description,
                updates,
            })
        })
        .collect()
}

/// Parse and validate a repair response. Updates may only touch `scope`;
/// echoed objects outside it are tolerated when they change nothing.
pub fn parse_repair(raw: &str, candidate: &Layout, scope: &[String]) -> Result<UpdateSet, TransientFailure> {
    let objects = match parse_json::<RawRepair>(raw)? {
        RawRepair::Bare(objects) | RawRepair::Wrapped { objects } => objects,
    };

    let mut updates = UpdateSet::new();
    for raw_update in &objects {
        let Some(current) = candidate.get(&raw_update.id) else {
            return Err(SchemaViolation::UnknownObject(raw_update.id.clone()).into());
        };
        let update = to_update(raw_update)?;
        if update.is_empty() {
            continue;
        }
        if !scope.iter().any(|id| id == &raw_update.id) {
            let moves = update.bbox.is_some_and(|b| b != current.bbox);
            let turns = update
                .orientation
                .is_some_and(|deg| crate::model::normalize_orientation(deg) != current.orientation);
            if moves || turns {
                return Err(SchemaViolation::OutOfScopeObject(raw_update.id.clone()).into());
            }
            continue;
        }
        updates.insert(raw_update.id.clone(), update);
    }
    Ok(updates)
}

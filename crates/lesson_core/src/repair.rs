//! crates/lesson_core/src/repair.rs
//!
//! Turns a raw model answer into a canonical `LessonPlan`.
//!
//! Models wrap their JSON in code fences, add prose after it, nest the plan under
//! a different key or answer with French key names. Each step here undoes one of
//! those habits; the last step back-fills whatever is still missing so that every
//! subsection leaves with a title, a content block and an image query.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::{LessonPlan, PlanSection, PlanSubsection};
use crate::error::GenerationError;

type JsonObject = Map<String, Value>;

/// A pure rewrite from one raw response shape to something closer to canonical.
type ShapeAdapter = fn(&JsonObject) -> Option<JsonObject>;

/// Tried in order until the object carries a `sections` key.
const SHAPE_ADAPTERS: &[(&str, ShapeAdapter)] = &[
    ("nested plan", hoist_nested_plan),
    ("main parts", map_main_parts),
];

const NESTED_PLAN_KEYS: &[&str] = &["plan_de_cours", "course_plan", "Plan de Cours", "PlanDeCours"];
const MAIN_PARTS_KEYS: &[&str] = &["grandes_parties", "Grandes Parties", "GrandesParties"];
const SUBPARTS_KEYS: &[&str] = &["sous_parties", "Sous-parties", "SousParties"];

const LESSON_TITLE_KEYS: &[&str] = &[
    "titre_lecon",
    "titre_lecon_officiel",
    "TitreLeconOfficiel",
    "Titre de la Leçon",
    "titre",
    "title",
    "lesson_title",
    "Lesson Title",
];
const DESCRIPTION_KEYS: &[&str] = &["description", "Introduction", "introduction"];
const CONCLUSION_KEYS: &[&str] = &["conclusion", "Conclusion"];
const PART_TITLE_KEYS: &[&str] = &["title", "titre", "titre_partie", "titre_officiel", "nom"];
const SUBPART_TITLE_KEYS: &[&str] = &["title", "titre", "titre_sous_partie", "nom"];
const SUBPART_CONTENT_KEYS: &[&str] = &["content", "contenu", "description", "texte"];
const SUBPART_IMAGE_KEYS: &[&str] = &["imageQuery", "mots_cles_image"];

/// Removes a leading ```` ```lang ```` marker and a trailing ```` ``` ````.
pub fn strip_code_fences(text: &str) -> &str {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest
            .trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .trim_start();
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest.trim_end();
    }
    cleaned
}

/// Isolates the first balanced `{ ... }` object, ignoring braces inside string
/// literals. Returns `None` when there is no `{` at all; an unbalanced object
/// yields everything from the first `{` onwards.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    warn!("Unbalanced JSON object in model response, using the remaining text");
    Some(&text[start..])
}

/// Cleans, isolates and parses the first JSON object of a model answer.
pub fn parse_json_object(raw: &str) -> Result<JsonObject, GenerationError> {
    let cleaned = strip_code_fences(raw);
    let json = extract_json_object(cleaned)
        .ok_or_else(|| GenerationError::Malformed("no JSON object detected".to_string()))?;
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(GenerationError::Malformed(
            "top-level JSON value is not an object".to_string(),
        )),
        Err(e) => Err(GenerationError::Malformed(format!("invalid JSON: {}", e))),
    }
}

/// The full repair pipeline for a lesson plan answer.
pub fn parse_lesson_plan(raw: &str) -> Result<LessonPlan, GenerationError> {
    let object = parse_json_object(raw)?;
    let canonical = normalize_shape(object)?;
    Ok(build_plan(&canonical))
}

/// Runs the shape adapters until the object has a `sections` list.
pub fn normalize_shape(object: JsonObject) -> Result<JsonObject, GenerationError> {
    let mut current = object;
    for (name, adapter) in SHAPE_ADAPTERS {
        if current.contains_key("sections") {
            break;
        }
        if let Some(adapted) = adapter(&current) {
            debug!(adapter = name, "Applied response shape adapter");
            current = adapted;
        }
    }

    match current.get("sections") {
        Some(Value::Array(_)) => Ok(current),
        _ => Err(GenerationError::Malformed(
            "\"sections\" is missing or not a list".to_string(),
        )),
    }
}

/// `{"plan_de_cours": {...}}` → the nested object, keeping the root title,
/// description and conclusion when the nested one lacks them.
fn hoist_nested_plan(root: &JsonObject) -> Option<JsonObject> {
    let mut nested = NESTED_PLAN_KEYS
        .iter()
        .find_map(|key| root.get(*key).and_then(Value::as_object))
        .cloned()?;

    for (canonical, synonyms) in [
        ("title", LESSON_TITLE_KEYS),
        ("description", DESCRIPTION_KEYS),
        ("conclusion", CONCLUSION_KEYS),
    ] {
        if first_text(&nested, synonyms).is_none() {
            if let Some(value) = first_text(root, synonyms) {
                nested.insert(canonical.to_string(), Value::String(value));
            }
        }
    }
    Some(nested)
}

/// `{"grandes_parties": [{"titre", "sous_parties": [...]}]}` → canonical sections.
fn map_main_parts(root: &JsonObject) -> Option<JsonObject> {
    let parts = MAIN_PARTS_KEYS
        .iter()
        .find_map(|key| root.get(*key).and_then(Value::as_array))?;

    let sections: Vec<Value> = parts
        .iter()
        .map(|part| {
            let empty = JsonObject::new();
            let part = part.as_object().unwrap_or(&empty);
            let subsections: Vec<Value> = SUBPARTS_KEYS
                .iter()
                .find_map(|key| part.get(*key).and_then(Value::as_array))
                .map(|subs| {
                    subs.iter()
                        .map(|sub| {
                            let sub = sub.as_object().unwrap_or(&empty);
                            let mut mapped = JsonObject::new();
                            insert_text(&mut mapped, "title", first_text(sub, SUBPART_TITLE_KEYS));
                            insert_text(&mut mapped, "content", first_text(sub, SUBPART_CONTENT_KEYS));
                            insert_text(
                                &mut mapped,
                                "imageQuery",
                                first_text(sub, SUBPART_IMAGE_KEYS)
                                    .or_else(|| first_text(sub, SUBPART_TITLE_KEYS)),
                            );
                            Value::Object(mapped)
                        })
                        .collect()
                })
                .unwrap_or_default();

            let mut section = JsonObject::new();
            insert_text(&mut section, "title", first_text(part, PART_TITLE_KEYS));
            section.insert("subsections".to_string(), Value::Array(subsections));
            Value::Object(section)
        })
        .collect();

    let mut mapped = JsonObject::new();
    insert_text(&mut mapped, "title", first_text(root, LESSON_TITLE_KEYS));
    insert_text(&mut mapped, "description", first_text(root, DESCRIPTION_KEYS));
    insert_text(&mut mapped, "conclusion", first_text(root, CONCLUSION_KEYS));
    mapped.insert("sections".to_string(), Value::Array(sections));
    Some(mapped)
}

/// Builds the typed plan from a canonical object, back-filling every gap with a
/// positional placeholder. Lesson title and description are left empty when
/// absent; the planner fills them from the request.
pub fn build_plan(object: &JsonObject) -> LessonPlan {
    let empty = JsonObject::new();
    let sections = object
        .get("sections")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            let raw = raw.as_object().unwrap_or(&empty);
            let title = text(raw, "title").unwrap_or_else(|| format!("Section {}", index + 1));
            let subsections = raw
                .get("subsections")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default()
                .iter()
                .enumerate()
                .map(|(sub_index, sub)| backfill_subsection(sub.as_object().unwrap_or(&empty), sub_index, &title))
                .collect();

            PlanSection {
                id: text(raw, "id"),
                check_understanding: raw
                    .get("check_understanding")
                    .or_else(|| raw.get("checkUnderstanding"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                title,
                subsections,
            }
        })
        .collect();

    LessonPlan {
        title: text(object, "title")
            .or_else(|| first_text(object, LESSON_TITLE_KEYS))
            .unwrap_or_default(),
        description: first_text(object, DESCRIPTION_KEYS).unwrap_or_default(),
        sections,
        conclusion: first_text(object, CONCLUSION_KEYS).unwrap_or_default(),
    }
}

fn backfill_subsection(raw: &JsonObject, index: usize, section_title: &str) -> PlanSubsection {
    let title = text(raw, "title").unwrap_or_else(|| format!("Subsection {}", index + 1));
    let content = text(raw, "content").unwrap_or_else(|| format!("Content pending for {}.", title));
    let image_query = text(raw, "imageQuery")
        .filter(|q| q != "undefined")
        .unwrap_or_else(|| {
            warn!(subsection = %title, "Missing image query, falling back to the title");
            [title.as_str(), section_title, "education"]
                .into_iter()
                .find(|candidate| !candidate.trim().is_empty())
                .unwrap_or("education")
                .to_string()
        });

    PlanSubsection {
        title,
        content,
        image_query,
    }
}

/// A non-blank string field, trimmed.
fn text(object: &JsonObject, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn first_text(object: &JsonObject, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| text(object, key))
}

fn insert_text(object: &mut JsonObject, key: &str, value: Option<String>) {
    if let Some(value) = value {
        object.insert(key.to_string(), Value::String(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTROL: &str = r#"{"title":"Cells","description":"Living units {with braces}","sections":[{"title":"Membrane","subsections":[{"title":"Lipids","content":"A \"bilayer\" } of lipids","imageQuery":"lipid bilayer"}]}],"conclusion":"Done"}"#;

    #[test]
    fn strips_fences_with_language_tag() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn extraction_returns_the_fenced_object_byte_for_byte() {
        let response = format!(
            "Here is the plan you asked for:\n```json\n{}\n```\nLet me know if you need {{more}} detail.",
            CONTROL
        );
        assert_eq!(extract_json_object(strip_code_fences(&response)), Some(CONTROL));
    }

    #[test]
    fn extraction_without_brace_is_none() {
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn unbalanced_object_keeps_the_tail() {
        assert_eq!(extract_json_object("x {\"a\": {\"b\": 1}"), Some("{\"a\": {\"b\": 1}"));
    }

    #[test]
    fn parses_canonical_plan() {
        let plan = parse_lesson_plan(CONTROL).unwrap();
        assert_eq!(plan.title, "Cells");
        assert_eq!(plan.sections.len(), 1);
        assert_eq!(plan.sections[0].subsections[0].image_query, "lipid bilayer");
        assert_eq!(plan.conclusion, "Done");
    }

    #[test]
    fn hoists_nested_plan_and_keeps_root_title() {
        let raw = r#"{"titre_lecon":"La cellule","plan_de_cours":{"description":"Intro","sections":[{"title":"A","subsections":[]}]}}"#;
        let plan = parse_lesson_plan(raw).unwrap();
        assert_eq!(plan.title, "La cellule");
        assert_eq!(plan.description, "Intro");
        assert_eq!(plan.sections[0].title, "A");
    }

    #[test]
    fn maps_french_main_parts() {
        let raw = r#"{
            "Titre de la Leçon": "La photosynthèse",
            "Introduction": "Comment les plantes produisent leur énergie",
            "grandes_parties": [
                {"titre_partie": "La lumière", "sous_parties": [
                    {"titre": "Chlorophylle", "contenu": "Pigment vert.", "mots_cles_image": "chlorophylle"},
                    {"nom": "Photons", "texte": "Particules de lumière."}
                ]},
                {"nom": "Le glucose"}
            ]
        }"#;
        let plan = parse_lesson_plan(raw).unwrap();
        assert_eq!(plan.title, "La photosynthèse");
        assert_eq!(plan.description, "Comment les plantes produisent leur énergie");
        assert_eq!(plan.sections.len(), 2);
        let first = &plan.sections[0];
        assert_eq!(first.title, "La lumière");
        assert_eq!(first.subsections[0].image_query, "chlorophylle");
        assert_eq!(first.subsections[1].title, "Photons");
        assert_eq!(first.subsections[1].content, "Particules de lumière.");
        assert_eq!(first.subsections[1].image_query, "Photons");
        assert_eq!(plan.sections[1].title, "Le glucose");
        assert!(plan.sections[1].subsections.is_empty());
    }

    #[test]
    fn missing_sections_is_malformed() {
        let err = parse_lesson_plan(r#"{"title":"x","parts":[]}"#).unwrap_err();
        assert!(matches!(err, GenerationError::Malformed(_)));
        let err = parse_lesson_plan(r#"{"title":"x","sections":"none"}"#).unwrap_err();
        assert!(matches!(err, GenerationError::Malformed(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn backfill_never_leaves_empty_fields() {
        let raw = r#"{"sections":[
            {"subsections":[{}, {"title":"  ", "content":"", "imageQuery":"undefined"}, 42]},
            {"title":"Second","subsections":[{"title":"Only title","imageQuery":"   "}]},
            "not an object"
        ]}"#;
        let plan = parse_lesson_plan(raw).unwrap();
        assert_eq!(plan.sections[0].title, "Section 1");
        assert_eq!(plan.sections[2].title, "Section 3");
        assert_eq!(plan.sections[0].subsections[0].title, "Subsection 1");
        assert_eq!(plan.sections[0].subsections[1].image_query, "Subsection 2");
        assert_eq!(plan.sections[1].subsections[0].image_query, "Only title");
        assert_eq!(
            plan.sections[1].subsections[0].content,
            "Content pending for Only title."
        );
        for section in &plan.sections {
            assert!(!section.title.is_empty());
            for sub in &section.subsections {
                assert!(!sub.title.trim().is_empty());
                assert!(!sub.content.trim().is_empty());
                assert!(!sub.image_query.trim().is_empty());
            }
        }
    }

    #[test]
    fn keeps_section_ids_from_the_model() {
        let raw = r#"{"sections":[{"id":"abc","title":"T","subsections":[],"check_understanding":true}]}"#;
        let plan = parse_lesson_plan(raw).unwrap();
        assert_eq!(plan.sections[0].id.as_deref(), Some("abc"));
        assert!(plan.sections[0].check_understanding);
    }
}

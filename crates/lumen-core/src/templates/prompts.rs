//! Prompt construction for the image and segmentation models.

const VIEW_MODIFIERS: &str =
    "side view, white background, centered, full body visible, studio lighting";

fn category_suffix(template_type: &str) -> &'static str {
    match template_type {
        "quadruped" => ", standing pose, four legs visible",
        "biped" => ", T-pose, symmetrical, arms extended",
        "bird" => ", wings slightly spread, perched",
        "fish" => ", swimming pose, fins visible",
        "vehicle" => ", three-quarter view, all wheels visible",
        "aircraft" => ", slight bank angle, both wings visible",
        "furniture" => ", three-quarter view, all legs visible",
        "plant" => ", full tree visible, roots to canopy",
        "building" => ", front-facing, full structure visible",
        "insect" => ", top-down slight angle, wings spread",
        _ => "",
    }
}

/// Reference-image prompt for a concept.
pub fn canonical_prompt(concept: &str, template_type: &str) -> String {
    let concept = concept.trim();
    let base = if concept.split_whitespace().count() <= 1 {
        format!("3D render of a {}, {}", concept.to_lowercase(), VIEW_MODIFIERS)
    } else {
        format!("{}, 3D render, {}", concept, VIEW_MODIFIERS)
    };
    base + category_suffix(template_type)
}

/// Natural-language segmentation phrase for a part name.
///
/// `front_legs` becomes `the front legs`; a leading article is kept.
pub fn part_phrase(name: &str) -> String {
    let phrase = name.replace('_', " ");
    let phrase = phrase.trim();
    let lower = phrase.to_lowercase();
    if ["the ", "a ", "an "].iter().any(|a| lower.starts_with(a)) {
        phrase.to_string()
    } else {
        format!("the {}", phrase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_noun_prompt() {
        assert_eq!(
            canonical_prompt("Horse", "quadruped"),
            "3D render of a horse, side view, white background, centered, full body visible, \
             studio lighting, standing pose, four legs visible"
        );
    }

    #[test]
    fn test_phrase_prompt() {
        let prompt = canonical_prompt("a red sports car", "vehicle");
        assert!(prompt.starts_with("a red sports car, 3D render, side view"));
        assert!(prompt.ends_with("all wheels visible"));
    }

    #[test]
    fn test_default_has_no_suffix() {
        assert!(canonical_prompt("blob", "default").ends_with("studio lighting"));
    }

    #[test]
    fn test_part_phrase() {
        assert_eq!(part_phrase("front_legs"), "the front legs");
        assert_eq!(part_phrase("the_roof"), "the roof");
        assert_eq!(part_phrase("a wing"), "a wing");
        assert_eq!(part_phrase("an_engine"), "an engine");
        assert_eq!(part_phrase("head"), "the head");
    }
}

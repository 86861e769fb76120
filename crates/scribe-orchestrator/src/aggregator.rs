//! Deterministic assembly of accepted section content.
//!
//! Emission order is always plan order, never completion order. Sections
//! without recorded content are skipped silently: a run forced to finish
//! early may legitimately leave sections unauthored. A post-pass removes
//! fenced code blocks whose normalized body repeats an earlier block, since
//! independent writers tend to re-emit the same install or run command.

use std::collections::{BTreeMap, HashSet};

use scribe_models::Plan;

/// Assemble the final artifact from the plan and the per-section content map.
pub fn aggregate(plan: &Plan, contents: &BTreeMap<String, String>) -> String {
    let mut parts = Vec::new();
    for section in plan.enabled_sections() {
        if let Some(content) = contents.get(&section.id) {
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
        }
    }
    dedup_code_blocks(&parts.join("\n\n"))
}

/// Drop fenced code blocks whose normalized body duplicates an earlier block.
///
/// Normalization collapses whitespace and lowercases, so `npm  install` and
/// `NPM install` count as the same command. The pass is idempotent: all
/// surviving blocks are distinct, so a second run removes nothing.
pub fn dedup_code_blocks(text: &str) -> String {
    let mut seen: HashSet<String> = HashSet::new();
    let mut output: Vec<&str> = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    let mut in_block = false;

    for line in text.lines() {
        let is_fence = line.trim_start().starts_with("```");
        if in_block {
            block.push(line);
            if is_fence {
                in_block = false;
                let body = &block[1..block.len() - 1];
                if seen.insert(normalize(body)) {
                    output.extend(block.iter().copied());
                }
                block.clear();
            }
        } else if is_fence {
            in_block = true;
            block.push(line);
        } else {
            output.push(line);
        }
    }

    // An unterminated fence is not a block; keep it verbatim.
    if in_block {
        output.extend(block.iter().copied());
    }

    output.join("\n")
}

fn normalize(lines: &[&str]) -> String {
    lines
        .iter()
        .flat_map(|line| line.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_models::SectionSpec;

    fn contents(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn output_follows_plan_order_not_insertion_order() {
        let plan = Plan::new(vec![
            SectionSpec::new("intro"),
            SectionSpec::new("usage"),
            SectionSpec::new("license"),
        ]);
        // BTreeMap iteration order differs from plan order here on purpose.
        let contents = contents(&[
            ("license", "## License"),
            ("intro", "## Intro"),
            ("usage", "## Usage"),
        ]);
        assert_eq!(aggregate(&plan, &contents), "## Intro\n\n## Usage\n\n## License");
    }

    #[test]
    fn disabled_and_unauthored_sections_are_skipped() {
        let plan = Plan::new(vec![
            SectionSpec::new("a"),
            SectionSpec::new("b").disabled(),
            SectionSpec::new("c"),
            SectionSpec::new("d"),
        ]);
        let contents = contents(&[("a", "alpha"), ("b", "bravo"), ("d", "  ")]);
        // b is disabled, c was never written, d is whitespace only.
        assert_eq!(aggregate(&plan, &contents), "alpha");
    }

    #[test]
    fn empty_plan_yields_empty_artifact() {
        assert_eq!(aggregate(&Plan::empty(), &BTreeMap::new()), "");
    }

    #[test]
    fn duplicate_code_blocks_are_dropped() {
        let text = "Install:\n```sh\nnpm install demo\n```\nRun:\n```sh\nNPM  INSTALL demo\n```\nDone.";
        let deduped = dedup_code_blocks(text);
        assert_eq!(deduped.matches("```").count(), 2);
        assert!(deduped.contains("npm install demo"));
        assert!(!deduped.contains("NPM  INSTALL demo"));
    }

    #[test]
    fn distinct_code_blocks_survive() {
        let text = "```sh\nnpm install\n```\n\n```sh\nnpm test\n```";
        assert_eq!(dedup_code_blocks(text), text);
    }

    #[test]
    fn dedup_is_idempotent() {
        let text = "a\n```sh\nmake\n```\nb\n```sh\n make \n```\nc\n```sh\ncargo run\n```";
        let once = dedup_code_blocks(text);
        let twice = dedup_code_blocks(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn unterminated_fence_is_preserved() {
        let text = "before\n```sh\nnpm install";
        assert_eq!(dedup_code_blocks(text), text);
    }
}

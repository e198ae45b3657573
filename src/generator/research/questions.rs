//! 子问题解析：去掉编号与项目符号，只保留问句，并补齐到目标数量

use std::sync::LazyLock;

use regex::Regex;

/// 行首的编号、项目符号或Markdown标题标记
static LEADING_MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*(?:(?:\d+[.)]|[-*•]+|#+)\s*)+").ok());

fn strip_marker(line: &str) -> &str {
    match LEADING_MARKER.as_ref().and_then(|re| re.find(line)) {
        Some(found) => &line[found.end()..],
        None => line,
    }
}

/// 从模型输出中解析出恰好 `count` 个子问题
pub fn parse_sub_questions(text: &str, topic: &str, count: usize) -> Vec<String> {
    let mut questions: Vec<String> = text
        .lines()
        .map(|line| strip_marker(line).trim())
        .filter(|line| line.contains('?'))
        .map(str::to_string)
        .take(count)
        .collect();

    let mut fallbacks = fallback_questions(topic);
    while questions.len() < count {
        let Some(candidate) = fallbacks.next() else {
            break;
        };
        if !questions.contains(&candidate) {
            questions.push(candidate);
        }
    }
    questions
}

/// 由主题派生的兜底问题，数量不限
fn fallback_questions(topic: &str) -> impl Iterator<Item = String> + '_ {
    let topic = topic.trim();
    let fixed = [
        format!("What is {} and why does it matter?", topic),
        format!("What are the latest developments in {}?", topic),
        format!("What are the main challenges and open problems in {}?", topic),
        format!("What are the practical applications and impacts of {}?", topic),
        format!("Where do experts disagree about {}?", topic),
    ];
    fixed.into_iter().chain(
        (1..).map(move |n| format!("What other aspects of {} deserve attention (part {})?", topic, n)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_numbering_and_bullets() {
        let text = "Here are the questions:\n\
                    1. What is Rust?\n\
                    2) How does the borrow checker work?\n\
                    - Why is Rust memory safe?\n\
                    * Who maintains Rust?";
        let questions = parse_sub_questions(text, "Rust", 4);
        assert_eq!(
            questions,
            vec![
                "What is Rust?",
                "How does the borrow checker work?",
                "Why is Rust memory safe?",
                "Who maintains Rust?",
            ]
        );
    }

    #[test]
    fn test_truncates_to_count() {
        let text = "A?\nB?\nC?\nD?";
        assert_eq!(parse_sub_questions(text, "T", 2), vec!["A?", "B?"]);
    }

    #[test]
    fn test_pads_with_topic_questions() {
        let questions = parse_sub_questions("No questions here.", "quantum computing", 3);
        assert_eq!(questions.len(), 3);
        assert!(questions.iter().all(|q| q.contains("quantum computing")));
        assert!(questions.iter().all(|q| q.ends_with('?')));
    }

    #[test]
    fn test_padding_beyond_fixed_templates_stays_unique() {
        let questions = parse_sub_questions("", "T", 8);
        assert_eq!(questions.len(), 8);
        let mut unique = questions.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 8);
    }

    #[test]
    fn test_zero_count_is_empty() {
        assert!(parse_sub_questions("What?", "T", 0).is_empty());
    }
}

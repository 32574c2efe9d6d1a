/// Message intent resolver — pure keyword heuristics, < 1ms, no model calls.
///
/// Maps a free-text chat message to one of the five task actions (or
/// `Unrecognized`).  Trigger groups are checked as case-insensitive substring
/// tests in a fixed priority order — add > list > complete > delete > update —
/// so a message matching several groups takes the first.  Parameters (task
/// title, 1-indexed position, replacement content) are pulled out with an
/// ordered list of regex patterns plus fallbacks; extraction never fails, it
/// only degrades.
use std::sync::OnceLock;

// ─── Regex constants ──────────────────────────────────────────────────────────

// "add the task to X" / "create X" — skips leading article/task filler
static RE_TITLE_DIRECT: OnceLock<regex::Regex> = OnceLock::new();
// "remind me to X" / "i need to X"
static RE_TITLE_REMIND: OnceLock<regex::Regex> = OnceLock::new();
// catch-all: everything after the first trigger phrase
static RE_TITLE_ANY: OnceLock<regex::Regex> = OnceLock::new();
// leading trigger words, for the strip-and-use-the-rest fallback
static RE_TRIGGER_PREFIX: OnceLock<regex::Regex> = OnceLock::new();
// trailing filler ("please", "today", ...) stripped off extracted titles
static RE_TRAILING_FILLER: OnceLock<regex::Regex> = OnceLock::new();
// "task 3" / "#2" position references
static RE_POSITION: OnceLock<regex::Regex> = OnceLock::new();
// quoted replacement content after to/with/new
static RE_CONTENT_QUOTED: OnceLock<regex::Regex> = OnceLock::new();
// free-text replacement content after to/with
static RE_CONTENT_FREE: OnceLock<regex::Regex> = OnceLock::new();

const STOP_TAIL: &str = r"(?:[.!?]|$|\s+please\b|\s+and\b|\s+but\b|\s+if\b|\s+when\b|\s+where\b|\s+how\b)";

fn re_title_direct() -> &'static regex::Regex {
    RE_TITLE_DIRECT.get_or_init(|| {
        regex::Regex::new(&format!(
            r"(?i)\b(?:add|create|make)\s+(?:(?:a|the|some)\s+)?(?:new\s+)?(?:(?:task|todo|item|reminder)\s+)?(?:(?:to|that|called|for)\s+)?(.+?){STOP_TAIL}"
        ))
        .expect("direct title regex")
    })
}

fn re_title_remind() -> &'static regex::Regex {
    RE_TITLE_REMIND.get_or_init(|| {
        regex::Regex::new(&format!(
            r"(?i)\b(?:remind me to|remind me that|i need to|need to)\s+(.+?){STOP_TAIL}"
        ))
        .expect("remind title regex")
    })
}

fn re_title_any() -> &'static regex::Regex {
    RE_TITLE_ANY.get_or_init(|| {
        regex::Regex::new(
            r"(?i)\b(?:add|create|make|remind me to|remind me that|i need to|need to)\s+(.+)",
        )
        .expect("catch-all title regex")
    })
}

fn re_trigger_prefix() -> &'static regex::Regex {
    RE_TRIGGER_PREFIX.get_or_init(|| {
        regex::Regex::new(
            r"(?i)^(?:add|create|make|new|remind me to|remind me that|i need to|need to)\s*",
        )
        .expect("trigger prefix regex")
    })
}

fn re_trailing_filler() -> &'static regex::Regex {
    RE_TRAILING_FILLER.get_or_init(|| {
        regex::Regex::new(
            r"(?i)\s+(?:please|now|today|tomorrow|later|soon|tonight|this week|this weekend|next week|asap)$",
        )
        .expect("trailing filler regex")
    })
}

fn re_position() -> &'static regex::Regex {
    RE_POSITION.get_or_init(|| {
        regex::Regex::new(r"(?i)\btask\s*#?\s*(\d+)\b|#\s*(\d+)\b").expect("position regex")
    })
}

fn re_content_quoted() -> &'static regex::Regex {
    RE_CONTENT_QUOTED.get_or_init(|| {
        regex::Regex::new(r#"(?i)\b(?:to|with|new)\s+["'](.+?)["']"#).expect("quoted content regex")
    })
}

fn re_content_free() -> &'static regex::Regex {
    RE_CONTENT_FREE.get_or_init(|| {
        regex::Regex::new(r"(?i)\b(?:to|with)\s+(.+?)(?:[.!?]|$|\s+please\b|\s+and\b|\s+but\b)")
            .expect("free content regex")
    })
}

// ─── Public types ─────────────────────────────────────────────────────────────

/// The classified action a message maps to.  Closed set — the dispatcher has
/// exactly one arm per variant and nothing is pluggable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    AddTask {
        title: String,
    },
    ListTasks,
    CompleteTask {
        /// 1-indexed position in the owner's task list, when the message
        /// named one ("task 3", "#2").  Absent = first pending task.
        position: Option<usize>,
    },
    DeleteTask {
        /// Absent = first task in store order.
        position: Option<usize>,
    },
    UpdateTask {
        position: Option<usize>,
        /// Replacement title, when one could be extracted.
        content: Option<String>,
    },
    Unrecognized,
}

impl Intent {
    /// Wire name of the tool this intent dispatches to, if any.
    pub fn tool_name(&self) -> Option<&'static str> {
        match self {
            Intent::AddTask { .. } => Some("add_task"),
            Intent::ListTasks => Some("list_tasks"),
            Intent::CompleteTask { .. } => Some("complete_task"),
            Intent::DeleteTask { .. } => Some("delete_task"),
            Intent::UpdateTask { .. } => Some("update_task"),
            Intent::Unrecognized => None,
        }
    }
}

// ─── Resolution ───────────────────────────────────────────────────────────────

/// Resolve a raw message to an intent plus extracted parameters.
///
/// This function is **pure** — no side effects, no async, no panics.
/// Empty and whitespace-only messages resolve to `Unrecognized`.
pub fn resolve(message: &str) -> Intent {
    // Truncate to 100KB to keep regex time bounded on pathological input.
    let message = truncate_at_boundary(message, 100_000);
    if message.trim().is_empty() {
        return Intent::Unrecognized;
    }

    let lower = message.to_lowercase();

    if contains_any(&lower, &["add", "create", "new", "remind me"]) {
        return Intent::AddTask {
            title: extract_title(&lower),
        };
    }
    if contains_any(&lower, &["list", "show", "view"]) {
        return Intent::ListTasks;
    }
    if contains_any(&lower, &["complete", "done", "finish"]) {
        return Intent::CompleteTask {
            position: extract_position(&lower),
        };
    }
    if contains_any(&lower, &["delete", "remove", "cancel"]) {
        return Intent::DeleteTask {
            position: extract_position(&lower),
        };
    }
    if contains_any(&lower, &["update", "change", "modify"]) {
        return Intent::UpdateTask {
            position: extract_position(&lower),
            content: extract_content(&lower),
        };
    }

    Intent::Unrecognized
}

fn contains_any(message: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| message.contains(k))
}

fn truncate_at_boundary(message: &str, max_bytes: usize) -> &str {
    if message.len() <= max_bytes {
        return message;
    }
    let mut end = max_bytes;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    &message[..end]
}

/// Try the extraction patterns in order, then fall back to the message with
/// trigger words stripped, then to the literal "New task".
fn extract_title(message: &str) -> String {
    for re in [re_title_direct(), re_title_remind(), re_title_any()] {
        if let Some(caps) = re.captures(message) {
            let candidate = strip_trailing_filler(caps[1].trim());
            if !is_stop_word_only(&candidate) {
                return candidate;
            }
        }
    }

    let stripped = re_trigger_prefix().replace(message.trim(), "");
    let candidate = strip_trailing_filler(stripped.trim());
    if is_stop_word_only(&candidate) {
        "New task".to_string()
    } else {
        candidate
    }
}

fn strip_trailing_filler(title: &str) -> String {
    let mut title = title.trim().to_string();
    loop {
        let stripped = re_trailing_filler().replace(&title, "").trim().to_string();
        if stripped == title {
            return title;
        }
        title = stripped;
    }
}

fn is_stop_word_only(title: &str) -> bool {
    matches!(title, "" | "a" | "the" | "some")
}

fn extract_position(message: &str) -> Option<usize> {
    let caps = re_position().captures(message)?;
    let digits = caps.get(1).or_else(|| caps.get(2))?;
    digits.as_str().parse::<usize>().ok()
}

fn extract_content(message: &str) -> Option<String> {
    if let Some(caps) = re_content_quoted().captures(message) {
        let content = caps[1].trim();
        if !content.is_empty() {
            return Some(content.to_string());
        }
    }
    if let Some(caps) = re_content_free().captures(message) {
        let content = strip_trailing_filler(caps[1].trim());
        if !content.is_empty() {
            return Some(content);
        }
    }
    None
}

// ─── Tests ────────────────────────────────────────────────────────────────────

//! Prompt construction. Wording is free to change; the structure is what
//! the parser relies on (a JSON action or list of actions back).

use std::fmt::Write;

use crate::types::{
    ElementDescriptor, ElementKind, HistoryEntry, PAGE_DESCRIPTION_MAX_CHARS, PageSnapshot,
};

pub const SYSTEM_PROMPT: &str =
    "You are a web navigation assistant that responds with structured JSON actions.";

const ACTION_GRAMMAR: &str = r##"Available actions:
- {"action": "navigate", "target": "https://example.com"}
- {"action": "click", "target": {"strategy": "css", "value": "#submit"}}
- {"action": "type", "target": {"strategy": "name", "value": "email"}, "value": "text to type"}
- {"action": "wait", "target": "2"}
- {"action": "extract", "target": {"strategy": "class_name", "value": "price"}}

Selector strategies: id, name, css, xpath, link_text, partial_link_text, class_name, tag_name.
A plain string target on click/type/extract is treated as a CSS selector.

Rules:
1. Return ONLY JSON: one action object, or a list of actions executed in order.
2. Prefer id or name selectors taken from the element list.
3. Do not repeat an action already listed under recent actions.
4. Only the last action of a list may change the page.
5. Add "task_complete": true to the final action once the task is done.
6. You may add an "explanation" string to any action."##;

/// Asks the model where to begin: a direct navigation or a search.
pub fn initial_prompt(task: &str) -> String {
    format!(
        r#"You are a web automation agent starting a new task.

User task: {task}

Respond with a SINGLE JSON object describing the first step:
{{"action": "navigate" | "search", "target": "<URL or search query>", "explanation": "<why>"}}

- If the task names a website, use "navigate" with its URL.
- Otherwise use "search" with a specific query.
- Output nothing outside the JSON object."#
    )
}

/// Builds the per-iteration prompt from the task, the fresh page snapshot
/// and the recent history window.
pub fn next_action_prompt(task: &str, snapshot: &PageSnapshot, recent: &[HistoryEntry]) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "You are navigating websites step by step to complete a task.");
    let _ = writeln!(prompt, "\nTask: {task}\n");
    prompt.push_str(&describe_page(snapshot));
    if !recent.is_empty() {
        prompt.push('\n');
        prompt.push_str(&describe_history(recent));
    }
    prompt.push('\n');
    prompt.push_str(ACTION_GRAMMAR);
    prompt
}

pub fn describe_page(snapshot: &PageSnapshot) -> String {
    let mut out = format!(
        "Current page:\nURL: {}\nTitle: {}\n\nAvailable elements:\n",
        snapshot.url, snapshot.title
    );

    let sections = [
        (ElementKind::Input, "Input fields"),
        (ElementKind::Clickable, "Buttons and clickable elements"),
        (ElementKind::Link, "Links"),
        (ElementKind::Other, "Other elements"),
    ];
    for (kind, heading) in sections {
        let mut group = snapshot.elements.iter().filter(|e| e.kind == kind).peekable();
        if group.peek().is_none() {
            continue;
        }
        let _ = writeln!(out, "\n{heading}:");
        for element in group {
            let _ = writeln!(out, "- {}", describe_element(element));
        }
    }

    if out.len() > PAGE_DESCRIPTION_MAX_CHARS {
        let total = out.len();
        let mut cut = PAGE_DESCRIPTION_MAX_CHARS;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
        let _ = writeln!(out, "\n... [truncated, {total} total chars]");
    }
    out
}

fn describe_element(element: &ElementDescriptor) -> String {
    let mut line = match element.kind {
        ElementKind::Input => format!("Input: {}", element.label()),
        ElementKind::Link => format!("Link: {}", element.label()),
        _ => format!("{}: {}", element.tag.to_uppercase(), element.label()),
    };
    if let Some(href) = element.href.as_deref().filter(|h| !h.is_empty()) {
        let _ = write!(line, " -> {href}");
    }
    if !element.id.is_empty() {
        let _ = write!(line, " (ID: {})", element.id);
    }
    if !element.name.is_empty() {
        let _ = write!(line, " (Name: {})", element.name);
    }
    if !element.locators.is_empty() {
        let selectors: Vec<String> = element
            .locators
            .iter()
            .map(|(strategy, value)| format!("{strategy}={value}"))
            .collect();
        let _ = write!(line, " [Selectors: {}]", selectors.join(", "));
    }
    line
}

pub fn describe_history(recent: &[HistoryEntry]) -> String {
    let mut out = String::from("Recent actions taken:\n");
    for (i, entry) in recent.iter().enumerate() {
        let _ = write!(
            out,
            "{}. {}: {}",
            i + 1,
            entry.kind.as_str().to_uppercase(),
            entry.target
        );
        if let Some(value) = &entry.value {
            let _ = write!(out, " with value: {value}");
        }
        let _ = writeln!(out, " at {}", entry.url);
    }
    out
}

//! Structural fingerprints.
//!
//! A fingerprint hashes a canonical line-per-element rendering of a snapshot.
//! Free text is left out except for title-like elements (and, in detailed
//! mode, the labels of clickable elements). Data rows (list item roles, or
//! id-less children of a scrollable container) are left out with their
//! subtrees, so a list showing no rows, one row or many keeps the same
//! fingerprint. Other runs of siblings sharing a structural signature
//! collapse into one marker.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use wayfinder_core_types::{Fingerprint, UiElement, UiSnapshot};

use crate::policy::FingerprintPolicy;

const STRUCTURAL_PREFIX: &str = "st_";
const DETAILED_PREFIX: &str = "fp_";
const DIGEST_BYTES: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintMode {
    /// Roles, ids, capability flags and title text. Used for loop detection.
    Structural,
    /// Structural plus the labels of clickable elements. Graph key.
    #[default]
    Detailed,
}

impl FingerprintMode {
    fn prefix(self) -> &'static str {
        match self {
            FingerprintMode::Structural => STRUCTURAL_PREFIX,
            FingerprintMode::Detailed => DETAILED_PREFIX,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Fingerprinter {
    policy: FingerprintPolicy,
}

impl Fingerprinter {
    pub fn new(policy: FingerprintPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &FingerprintPolicy {
        &self.policy
    }

    pub fn compute(&self, snapshot: &UiSnapshot, mode: FingerprintMode) -> Fingerprint {
        let canonical = self.canonical(snapshot, mode);
        let digest = Sha256::digest(canonical.as_bytes());
        Fingerprint(format!(
            "{}{}",
            mode.prefix(),
            hex::encode(&digest[..DIGEST_BYTES])
        ))
    }

    pub fn structural(&self, snapshot: &UiSnapshot) -> Fingerprint {
        self.compute(snapshot, FingerprintMode::Structural)
    }

    pub fn detailed(&self, snapshot: &UiSnapshot) -> Fingerprint {
        self.compute(snapshot, FingerprintMode::Detailed)
    }

    /// The exact text that gets hashed. Exposed for debugging fingerprint drift.
    pub fn canonical(&self, snapshot: &UiSnapshot, mode: FingerprintMode) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "root:{}", snapshot.root_role.trim().to_ascii_lowercase());

        let elements: Vec<&UiElement> = snapshot
            .elements
            .iter()
            .filter(|el| el.depth <= self.policy.max_depth)
            .collect();

        // Depths of the enclosing scrollable containers, innermost last.
        let mut scroll_stack: Vec<u32> = Vec::new();
        let mut skip_below: Option<u32> = None;
        let mut idx = 0;
        while idx < elements.len() {
            let element = elements[idx];
            if let Some(row_depth) = skip_below {
                if element.depth > row_depth {
                    idx += 1;
                    continue;
                }
                skip_below = None;
            }
            while scroll_stack
                .last()
                .is_some_and(|depth| *depth >= element.depth)
            {
                scroll_stack.pop();
            }
            let scroll_child = scroll_stack
                .last()
                .is_some_and(|depth| element.depth == depth + 1)
                && element.id.is_none();
            if scroll_child || self.is_list_row(element) {
                skip_below = Some(element.depth);
                idx += 1;
                continue;
            }
            if element.scrollable {
                scroll_stack.push(element.depth);
            }

            let signature = self.signature(element);
            let mut run = 1;
            while idx + run < elements.len() && self.signature(elements[idx + run]) == signature {
                run += 1;
            }

            if run > 1 {
                let _ = writeln!(out, "{signature}*");
            } else {
                out.push_str(&signature);
                if let Some(text) = self.structural_text(element, mode) {
                    out.push('~');
                    out.push_str(&text);
                }
                out.push('\n');
            }
            idx += run;
        }
        out
    }

    fn signature(&self, element: &UiElement) -> String {
        format!(
            "{}:{}#{}[{}{}{}]",
            element.depth,
            self.normalize_role(&element.role),
            element.id.as_deref().map(str::trim).unwrap_or("-"),
            flag(element.clickable, 'c'),
            flag(element.scrollable, 's'),
            flag(element.editable, 'e'),
        )
    }

    fn structural_text(&self, element: &UiElement, mode: FingerprintMode) -> Option<String> {
        let include = self.is_title(element)
            || (mode == FingerprintMode::Detailed && element.clickable && !element.editable);
        if !include {
            return None;
        }
        element
            .label
            .as_deref()
            .map(collapse_whitespace)
            .filter(|text| !text.is_empty())
    }

    /// Lowercases, drops transient state tokens and sorts the remaining tokens.
    pub fn normalize_role(&self, role: &str) -> String {
        let mut tokens: Vec<String> = role
            .split_whitespace()
            .map(|token| token.to_ascii_lowercase())
            .filter(|token| !self.is_volatile(token))
            .collect();
        tokens.sort();
        tokens.dedup();
        tokens.join(" ")
    }

    fn is_volatile(&self, token: &str) -> bool {
        let bare = token
            .trim_start_matches(':')
            .trim_start_matches("is-")
            .trim_start_matches("--");
        self.policy
            .volatile_tokens
            .iter()
            .any(|volatile| volatile == bare)
    }

    /// Repeated data row, by role.
    pub fn is_list_row(&self, element: &UiElement) -> bool {
        self.role_in(&element.role, &self.policy.list_item_roles)
    }

    fn role_in(&self, role: &str, roles: &[String]) -> bool {
        self.normalize_role(role).split(' ').any(|token| {
            let tail = token.rsplit('.').next().unwrap_or(token);
            roles.iter().any(|known| known == token || known == tail)
        })
    }

    pub fn is_title(&self, element: &UiElement) -> bool {
        if self.role_in(&element.role, &self.policy.title_roles) {
            return true;
        }
        !element.is_interactive()
            && element
                .id
                .as_deref()
                .map(|id| {
                    let id = id.to_ascii_lowercase();
                    id.contains("title") || id.contains("header")
                })
                .unwrap_or(false)
    }
}

fn flag(set: bool, letter: char) -> char {
    if set {
        letter
    } else {
        '-'
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

//! Hook composition
//!
//! Folds hook sets left to right into one:
//! - `tool` entries are shallow-merged, later names overwrite earlier ones
//! - `auth` is replaced by a later value when present
//! - every callable slot is chained so the earlier hook finishes before the
//!   later one starts
//!
//! Inputs are never modified.

use super::protocol::HookSet;

/// Merge `extra` onto `base`, in order
pub fn merge_hooks(base: &HookSet, extra: &[HookSet]) -> HookSet {
    extra
        .iter()
        .fold(base.clone(), |acc, next| merge_pair(&acc, next))
}

/// Merge a list of hook sets starting from an empty one
pub fn merge_all(sets: &[HookSet]) -> HookSet {
    merge_hooks(&HookSet::default(), sets)
}

fn merge_pair(earlier: &HookSet, later: &HookSet) -> HookSet {
    let mut tool = earlier.tool.clone();
    for (name, definition) in &later.tool {
        tool.insert(name.clone(), definition.clone());
    }

    let auth = later.auth.clone().or_else(|| earlier.auth.clone());

    let mut hooks = earlier.hooks.clone();
    for (slot, hook) in &later.hooks {
        let composed = match earlier.hooks.get(slot) {
            Some(previous) => previous.then(hook),
            None => hook.clone(),
        };
        hooks.insert(*slot, composed);
    }

    HookSet { tool, auth, hooks }
}

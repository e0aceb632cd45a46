//! Deterministic plan-step selection for the iteration loop.

/// Pick the step an iteration works on.
///
/// Returns the first plan step not yet completed. When every step is done but
/// iterations remain, wraps to `plan[index % plan.len()]` so the loop still
/// has a step to narrate. `index` is the 0-based iteration index. Returns
/// `None` only for an empty plan.
pub fn select_step<'a>(plan: &'a [String], completed: &[String], index: usize) -> Option<&'a str> {
    if plan.is_empty() {
        return None;
    }
    plan.iter()
        .find(|step| !completed.contains(step))
        .or_else(|| plan.get(index % plan.len()))
        .map(String::as_str)
}

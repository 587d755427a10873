//! ---
//! probe_section: "04-orchestration"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Deployment scaling and node scheduling control."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
//! Pure edits of a node's taint list.
use k8s_openapi::api::core::v1::Taint;

pub const EFFECT_NO_SCHEDULE: &str = "NoSchedule";

/// Add a `NoSchedule` taint, or update the value of an existing one with the same key.
/// Returns `None` when the list already carries the exact taint.
pub fn with_taint(mut taints: Vec<Taint>, key: &str, value: &str) -> Option<Vec<Taint>> {
    match taints
        .iter_mut()
        .find(|taint| taint.key == key && taint.effect == EFFECT_NO_SCHEDULE)
    {
        Some(existing) if existing.value.as_deref() == Some(value) => None,
        Some(existing) => {
            existing.value = Some(value.to_owned());
            Some(taints)
        }
        None => {
            taints.push(Taint {
                key: key.to_owned(),
                value: Some(value.to_owned()),
                effect: EFFECT_NO_SCHEDULE.to_owned(),
                time_added: None,
            });
            Some(taints)
        }
    }
}

/// Remove every `NoSchedule` taint with `key`. Returns `None` when nothing matched.
pub fn without_taint(mut taints: Vec<Taint>, key: &str) -> Option<Vec<Taint>> {
    let before = taints.len();
    taints.retain(|taint| !(taint.key == key && taint.effect == EFFECT_NO_SCHEDULE));
    (taints.len() != before).then_some(taints)
}

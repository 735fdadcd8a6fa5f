//! The static catalog of model and voice identifiers the control plane
//! knows about. Not part of spec.md's data model directly, but required
//! to implement `MODEL_NOT_FOUND` (§4.2 step 5) and `GET /api/v1/models`
//! (§6.1) concretely rather than accepting an arbitrary string.

use tessera_protocol::domain::Capability;

/// `(model_id, capability)` pairs the control plane recognizes as valid
/// dispatch targets. Workers report their actually loaded subset via
/// heartbeat (§4.5); this catalog is the full universe they're drawn from.
pub const KNOWN_MODELS: &[(&str, Capability)] = &[
    ("sdxl", Capability::Image),
    ("sdxl-turbo", Capability::Image),
    ("flux-schnell", Capability::Image),
    ("svd", Capability::Video),
    ("animatediff", Capability::Video),
    ("llama3-8b", Capability::Text),
    ("mixtral-8x7b", Capability::Text),
    ("alloy", Capability::Audio),
    ("narrator", Capability::Audio),
];

pub fn exists(capability: Capability, model_id: &str) -> bool {
    KNOWN_MODELS
        .iter()
        .any(|(id, cap)| *id == model_id && *cap == capability)
}

pub fn for_capability(capability: Capability) -> impl Iterator<Item = &'static str> {
    KNOWN_MODELS
        .iter()
        .filter(move |(_, cap)| *cap == capability)
        .map(|(id, _)| *id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_exists_under_its_capability_only() {
        assert!(exists(Capability::Image, "sdxl"));
        assert!(!exists(Capability::Video, "sdxl"));
    }

    #[test]
    fn unknown_model_does_not_exist() {
        assert!(!exists(Capability::Image, "not-a-real-model"));
    }
}

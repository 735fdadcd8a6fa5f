//! Per-capability parameter validation (spec.md §4.2 step 5). One pure
//! function per capability, independent of the database so each rule is
//! unit-testable on its own.

use tessera_db::plans::Plan;
use tessera_protocol::domain::Capability;
use tessera_protocol::error::TesseraError;
use tessera_protocol::job::params::{AudioParams, ImageParams, TextParams, VideoParams};

use crate::cost::parse_resolution;
use crate::models;

const MAX_PROMPT_CHARS: usize = 2048;
/// Not named as a plan attribute in spec.md §3; resolved as a flat ceiling
/// shared by every tier (DESIGN.md "audio duration limit").
const MAX_AUDIO_DURATION_SECONDS: f64 = 120.0;
const MAX_TIMEOUT_SECONDS: u32 = 600;

/// A caller-supplied `timeout_seconds` is optional (default 300) but bounded
/// above at 600 (§5). Checked once, shared by every capability.
fn check_timeout(timeout_seconds: Option<u32>) -> Result<(), TesseraError> {
    match timeout_seconds {
        Some(0) | None => Ok(()),
        Some(t) if t > MAX_TIMEOUT_SECONDS => Err(TesseraError::InvalidParams(format!(
            "timeout_seconds must be at most {MAX_TIMEOUT_SECONDS}"
        ))),
        Some(_) => Ok(()),
    }
}

fn check_model(model: &str, capability: Capability, plan: &Plan) -> Result<(), TesseraError> {
    if !models::exists(capability, model) {
        return Err(TesseraError::ModelNotFound(model.to_string()));
    }
    if !plan.allows_model(model) {
        return Err(TesseraError::InvalidParams(format!(
            "model {model} is not available on the {:?} plan",
            plan.tier
        )));
    }
    Ok(())
}

pub fn validate_image(params: &ImageParams, plan: &Plan) -> Result<(), TesseraError> {
    if params.prompt.trim().is_empty() {
        return Err(TesseraError::InvalidPrompt("prompt must not be empty".into()));
    }
    if params.prompt.len() > MAX_PROMPT_CHARS {
        return Err(TesseraError::InvalidPrompt(format!(
            "prompt exceeds {MAX_PROMPT_CHARS} characters"
        )));
    }
    let (w, h) = parse_resolution(&params.resolution)
        .ok_or_else(|| TesseraError::InvalidParams(format!("malformed resolution {:?}", params.resolution)))?;
    if w > plan.max_resolution as u32 || h > plan.max_resolution as u32 {
        return Err(TesseraError::InvalidParams(format!(
            "resolution {w}x{h} exceeds plan limit {}",
            plan.max_resolution
        )));
    }
    if !(1..=100).contains(&params.steps) {
        return Err(TesseraError::InvalidParams("steps must be in [1, 100]".into()));
    }
    check_timeout(params.timeout_seconds)?;
    check_model(&params.model, Capability::Image, plan)
}

pub fn validate_video(params: &VideoParams, plan: &Plan) -> Result<(), TesseraError> {
    if params.prompt.trim().is_empty() {
        return Err(TesseraError::InvalidPrompt("prompt must not be empty".into()));
    }
    if !(1..=30).contains(&params.duration) {
        return Err(TesseraError::InvalidParams("duration must be in [1, 30] seconds".into()));
    }
    if !(8..=60).contains(&params.fps) {
        return Err(TesseraError::InvalidParams("fps must be in [8, 60]".into()));
    }
    check_timeout(params.timeout_seconds)?;
    check_model(&params.model, Capability::Video, plan)
}

pub fn validate_text(params: &TextParams, plan: &Plan) -> Result<(), TesseraError> {
    if params.prompt.trim().is_empty() {
        return Err(TesseraError::InvalidPrompt("prompt must not be empty".into()));
    }
    if !(1..=4096).contains(&params.max_tokens) {
        return Err(TesseraError::InvalidParams("max_tokens must be in [1, 4096]".into()));
    }
    check_timeout(params.timeout_seconds)?;
    check_model(&params.model, Capability::Text, plan)
}

pub fn validate_audio(params: &AudioParams, plan: &Plan) -> Result<(), TesseraError> {
    if !models::exists(Capability::Audio, &params.voice_id) {
        return Err(TesseraError::ModelNotFound(params.voice_id.clone()));
    }
    let _ = plan; // voices are not plan-gated, unlike image/video/text models
    if params.duration <= 0.0 || params.duration > MAX_AUDIO_DURATION_SECONDS {
        return Err(TesseraError::InvalidParams(format!(
            "duration must be in (0, {MAX_AUDIO_DURATION_SECONDS}] seconds"
        )));
    }
    check_timeout(params.timeout_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json;

    fn free_plan() -> Plan {
        Plan {
            tier: tessera_protocol::domain::PlanTier::Free,
            daily_token_limit: 20,
            requests_per_minute: 10,
            max_concurrent_jobs: 2,
            priority: 0,
            max_resolution: 1024,
            allowed_models: Json(vec!["*".to_string()]),
            price_cents: 0,
            description: String::new(),
            active: true,
        }
    }

    #[test]
    fn boundary_resolution_equal_to_plan_max_is_accepted() {
        let params = ImageParams {
            prompt: "ok".into(),
            resolution: "1024x1024".into(),
            steps: 20,
            model: "sdxl".into(),
            timeout_seconds: None,
        };
        assert!(validate_image(&params, &free_plan()).is_ok());
    }

    #[test]
    fn one_pixel_over_plan_max_is_rejected() {
        let params = ImageParams {
            prompt: "ok".into(),
            resolution: "1025x1024".into(),
            steps: 20,
            model: "sdxl".into(),
            timeout_seconds: None,
        };
        assert!(matches!(
            validate_image(&params, &free_plan()),
            Err(TesseraError::InvalidParams(_))
        ));
    }

    #[test]
    fn empty_prompt_is_invalid_prompt_not_invalid_params() {
        let params = ImageParams {
            prompt: "".into(),
            resolution: "512x512".into(),
            steps: 20,
            model: "sdxl".into(),
            timeout_seconds: None,
        };
        assert!(matches!(
            validate_image(&params, &free_plan()),
            Err(TesseraError::InvalidPrompt(_))
        ));
    }

    #[test]
    fn unknown_model_is_model_not_found() {
        let params = ImageParams {
            prompt: "ok".into(),
            resolution: "512x512".into(),
            steps: 20,
            model: "does-not-exist".into(),
            timeout_seconds: None,
        };
        assert!(matches!(
            validate_image(&params, &free_plan()),
            Err(TesseraError::ModelNotFound(_))
        ));
    }

    #[test]
    fn timeout_at_max_is_accepted_but_one_over_is_rejected() {
        let mut params = ImageParams {
            prompt: "ok".into(),
            resolution: "512x512".into(),
            steps: 20,
            model: "sdxl".into(),
            timeout_seconds: Some(600),
        };
        assert!(validate_image(&params, &free_plan()).is_ok());
        params.timeout_seconds = Some(601);
        assert!(matches!(
            validate_image(&params, &free_plan()),
            Err(TesseraError::InvalidParams(_))
        ));
    }

    #[test]
    fn video_fps_out_of_range_is_rejected() {
        let params = VideoParams {
            prompt: "ok".into(),
            duration: 5,
            fps: 200,
            resolution: tessera_protocol::job::params::VideoResolution::P720,
            model: "svd".into(),
            timeout_seconds: None,
        };
        assert!(validate_video(&params, &free_plan()).is_err());
    }
}

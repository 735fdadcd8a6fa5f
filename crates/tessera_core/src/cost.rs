//! Cost calculation (spec.md §4.2 step 6). Pure, deterministic, all
//! arithmetic in 2-dp decimal so the same request always prices the same
//! regardless of floating-point rounding.

use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;
use tessera_protocol::job::params::{AudioParams, ImageParams, TextParams, VideoParams};

/// The minimum billable cost for any admitted job.
pub const MIN_BILLABLE_COST: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

fn round2(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn at_least_minimum(cost: Decimal) -> Decimal {
    cost.max(MIN_BILLABLE_COST)
}

/// Parse a `WxH` resolution string, e.g. `"1024x1024"`.
pub fn parse_resolution(resolution: &str) -> Option<(u32, u32)> {
    let (w, h) = resolution.split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

/// `cost = (W·H / 1024²) · (steps/20)`.
pub fn image_cost(params: &ImageParams) -> Option<Decimal> {
    let (w, h) = parse_resolution(&params.resolution)?;
    let pixels = Decimal::from(w) * Decimal::from(h);
    let base = pixels / Decimal::from(1024u32 * 1024);
    let step_factor = Decimal::from(params.steps) / Decimal::from(20);
    Some(at_least_minimum(round2(base * step_factor)))
}

/// `cost = duration · 3 / 5`, scaled by a resolution multiplier
/// (480p ×0.5, 720p ×1.0, 1080p ×2.0).
pub fn video_cost(params: &VideoParams) -> Decimal {
    let base = Decimal::from(params.duration) * Decimal::new(3, 0) / Decimal::new(5, 0);
    let multiplier = Decimal::try_from(params.resolution.cost_multiplier()).unwrap_or(Decimal::ONE);
    at_least_minimum(round2(base * multiplier))
}

/// `cost = max_tokens / 1000`.
pub fn text_cost(params: &TextParams) -> Decimal {
    at_least_minimum(round2(Decimal::from(params.max_tokens) / Decimal::from(1000)))
}

/// Flat `0.5` per request.
pub fn audio_cost(_params: &AudioParams) -> Decimal {
    at_least_minimum(Decimal::new(50, 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_protocol::job::params::VideoResolution;

    #[test]
    fn s1_happy_path_image_cost_is_one_token() {
        let params = ImageParams {
            prompt: "a sunset".into(),
            resolution: "1024x1024".into(),
            steps: 20,
            model: "sdxl".into(),
            timeout_seconds: None,
        };
        assert_eq!(image_cost(&params).unwrap(), Decimal::new(100, 2));
    }

    #[test]
    fn image_cost_respects_minimum_billable() {
        let params = ImageParams {
            prompt: "tiny".into(),
            resolution: "64x64".into(),
            steps: 1,
            model: "sdxl".into(),
            timeout_seconds: None,
        };
        assert_eq!(image_cost(&params).unwrap(), MIN_BILLABLE_COST);
    }

    #[test]
    fn video_cost_scales_with_resolution_multiplier() {
        let base = VideoParams {
            prompt: "clip".into(),
            duration: 10,
            fps: 24,
            resolution: VideoResolution::P720,
            model: "svd".into(),
            timeout_seconds: None,
        };
        assert_eq!(video_cost(&base), Decimal::new(600, 2));

        let p1080 = VideoParams {
            resolution: VideoResolution::P1080,
            ..base.clone()
        };
        assert_eq!(video_cost(&p1080), Decimal::new(1200, 2));

        let p480 = VideoParams {
            resolution: VideoResolution::P480,
            ..base
        };
        assert_eq!(video_cost(&p480), Decimal::new(300, 2));
    }

    #[test]
    fn text_cost_divides_max_tokens_by_one_thousand() {
        let params = TextParams {
            prompt: "hi".into(),
            max_tokens: 2048,
            model: "llama3-8b".into(),
            timeout_seconds: None,
        };
        assert_eq!(text_cost(&params), Decimal::new(205, 2));
    }

    #[test]
    fn audio_cost_is_flat_half_token() {
        let params = AudioParams {
            text: "hello".into(),
            voice_id: "alloy".into(),
            duration: 5.0,
            timeout_seconds: None,
        };
        assert_eq!(audio_cost(&params), Decimal::new(50, 2));
    }

    #[test]
    fn malformed_resolution_is_rejected() {
        let params = ImageParams {
            prompt: "x".into(),
            resolution: "not-a-resolution".into(),
            steps: 10,
            model: "sdxl".into(),
            timeout_seconds: None,
        };
        assert!(image_cost(&params).is_none());
    }
}

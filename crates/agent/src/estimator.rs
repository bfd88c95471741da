use rust_decimal::Decimal;
use serde::Deserialize;

use mudey_core::domain::request::PriceRange;
use mudey_core::pricing::{clamp_estimate, fallback_estimate, PriceEstimate, PricingPolicy};

use crate::llm::CompletionClient;
use crate::prompt::{build_prompt, EstimateInput};

/// Price-estimation service: prompt the completion service, parse its JSON,
/// then force the deterministic floor and margin invariants onto whatever
/// came back.
///
/// `estimate` returns `None` for every failure mode (transport, status,
/// malformed output) so callers can switch to [`fallback`](Self::fallback)
/// without caring why the model path died.
pub struct PriceEstimator<C> {
    client: C,
    policy: PricingPolicy,
}

impl<C> PriceEstimator<C>
where
    C: CompletionClient,
{
    pub fn new(client: C, policy: PricingPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &PricingPolicy {
        &self.policy
    }

    pub async fn estimate(&self, input: &EstimateInput) -> Option<PriceEstimate> {
        let prompt = build_prompt(input, &self.policy);
        let raw = self.client.complete(&prompt).await.ok()?;
        let mut estimate = parse_completion(&raw)?;

        clamp_estimate(
            &self.policy,
            input.property_type,
            input.needs_packing,
            input.has_elevator,
            &mut estimate,
        );

        Some(estimate)
    }

    /// Deterministic wide-range estimate for when the model path is down.
    pub fn fallback(&self, input: &EstimateInput) -> PriceEstimate {
        fallback_estimate(
            &self.policy,
            input.property_type,
            input.needs_packing,
            input.has_elevator,
            &input.origin_raw,
            &input.destination_raw,
        )
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionPayload {
    distance_km: f64,
    preco_min: Decimal,
    preco_max: Decimal,
    explicacao: String,
    #[serde(default)]
    cidade_origem: Option<String>,
    #[serde(default)]
    estado_origem: Option<String>,
    #[serde(default)]
    cidade_destino: Option<String>,
    #[serde(default)]
    estado_destino: Option<String>,
}

/// Parses the completion output into an estimate. Tolerates markdown code
/// fences and prose around the object, but requires exactly one JSON
/// object with plausible numbers.
fn parse_completion(raw: &str) -> Option<PriceEstimate> {
    let body = extract_json_object(raw)?;
    let payload: CompletionPayload = serde_json::from_str(body).ok()?;

    if payload.distance_km < 0.0
        || !payload.distance_km.is_finite()
        || payload.preco_min <= Decimal::ZERO
        || payload.preco_max <= Decimal::ZERO
    {
        return None;
    }

    Some(PriceEstimate {
        distance_km: payload.distance_km,
        price: PriceRange::new(payload.preco_min, payload.preco_max),
        explanation: payload.explicacao,
        origin_city: non_empty(payload.cidade_origem),
        origin_state: non_empty(payload.estado_origem).map(|uf| uf.to_uppercase()),
        destination_city: non_empty(payload.cidade_destino),
        destination_state: non_empty(payload.estado_destino).map(|uf| uf.to_uppercase()),
    })
}

fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::request::{PriceRange, PropertyType, MIN_PRICE_MARGIN};

/// Brazilian state codes with the full names matched against raw
/// origin/destination text by the fallback extractor.
pub const STATE_CODES: &[(&str, &str)] = &[
    ("AC", "acre"),
    ("AL", "alagoas"),
    ("AP", "amapa"),
    ("AM", "amazonas"),
    ("BA", "bahia"),
    ("CE", "ceara"),
    ("DF", "distrito federal"),
    ("ES", "espirito santo"),
    ("GO", "goias"),
    ("MA", "maranhao"),
    ("MT", "mato grosso"),
    ("MS", "mato grosso do sul"),
    ("MG", "minas gerais"),
    ("PA", "para"),
    ("PB", "paraiba"),
    ("PR", "parana"),
    ("PE", "pernambuco"),
    ("PI", "piaui"),
    ("RJ", "rio de janeiro"),
    ("RN", "rio grande do norte"),
    ("RS", "rio grande do sul"),
    ("RO", "rondonia"),
    ("RR", "roraima"),
    ("SC", "santa catarina"),
    ("SP", "sao paulo"),
    ("SE", "sergipe"),
    ("TO", "tocantins"),
];

/// Deterministic pricing heuristics shared by the floor computation, the
/// completion-service prompt, and the fallback estimator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Fuel and toll cost per kilometre, BRL.
    pub per_km_cost: Decimal,
    /// Fraction of the base tier cost added when packing is requested.
    pub packing_surcharge_pct: Decimal,
    /// Fraction of the base tier cost added when there is no elevator.
    pub no_elevator_surcharge_pct: Decimal,
    /// Hauls past this distance incur the overnight surcharge.
    pub overnight_threshold_km: u32,
    pub overnight_surcharge: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            per_km_cost: Decimal::new(4_00, 2),
            packing_surcharge_pct: Decimal::new(20, 2),
            no_elevator_surcharge_pct: Decimal::new(10, 2),
            overnight_threshold_km: 400,
            overnight_surcharge: Decimal::new(450_00, 2),
        }
    }
}

impl PricingPolicy {
    /// Base moving cost per property tier, BRL.
    pub fn base_cost(&self, property: PropertyType) -> Decimal {
        match property {
            PropertyType::Studio => Decimal::new(800_00, 2),
            PropertyType::OneBedroom => Decimal::new(1_200_00, 2),
            PropertyType::TwoBedrooms => Decimal::new(1_800_00, 2),
            PropertyType::ThreeBedrooms => Decimal::new(2_600_00, 2),
            PropertyType::FourPlusBedrooms => Decimal::new(3_500_00, 2),
            PropertyType::Office => Decimal::new(3_000_00, 2),
        }
    }
}

/// Structured output of an estimation pass, model-backed or fallback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceEstimate {
    pub distance_km: f64,
    pub price: PriceRange,
    pub explanation: String,
    pub origin_city: Option<String>,
    pub origin_state: Option<String>,
    pub destination_city: Option<String>,
    pub destination_state: Option<String>,
}

/// Minimum plausible price for a move, independent of any model output.
pub fn deterministic_floor(
    policy: &PricingPolicy,
    property: PropertyType,
    distance_km: f64,
    needs_packing: bool,
    has_elevator: bool,
) -> Decimal {
    let base = policy.base_cost(property);
    let distance = Decimal::from_f64_retain(distance_km.max(0.0)).unwrap_or_default();
    let mut floor = base + (distance * policy.per_km_cost);

    if needs_packing {
        floor += base * policy.packing_surcharge_pct;
    }
    if !has_elevator {
        floor += base * policy.no_elevator_surcharge_pct;
    }
    if distance_km > f64::from(policy.overnight_threshold_km) {
        floor += policy.overnight_surcharge;
    }

    floor.round_dp(2)
}

/// Applies the floor and margin invariants to a model-produced estimate.
///
/// A low `min` (below 80% of the floor) is raised to 90% of the floor, and
/// `max` is then lifted to honor the minimum margin. Implausibly high model
/// prices are deliberately left alone: a conservative over-estimate is
/// preferable to silently shrinking the quote.
pub fn clamp_estimate(
    policy: &PricingPolicy,
    property: PropertyType,
    needs_packing: bool,
    has_elevator: bool,
    estimate: &mut PriceEstimate,
) {
    let floor =
        deterministic_floor(policy, property, estimate.distance_km, needs_packing, has_elevator);
    let soft_floor = (floor * Decimal::new(8, 1)).round_dp(2);

    if estimate.price.min < soft_floor {
        estimate.price.min = (floor * Decimal::new(9, 1)).round_dp(2);
    }
    let min_max = (estimate.price.min * MIN_PRICE_MARGIN).round_dp(2);
    if estimate.price.max < min_max {
        estimate.price.max = min_max;
    }
}

/// Deterministic estimator used when the completion service is unavailable.
///
/// Emits a wide generic range anchored on the property tier and never
/// claims precision; city/state resolution is a best-effort keyword match.
pub fn fallback_estimate(
    policy: &PricingPolicy,
    property: PropertyType,
    needs_packing: bool,
    has_elevator: bool,
    origin_raw: &str,
    destination_raw: &str,
) -> PriceEstimate {
    let min = deterministic_floor(policy, property, 0.0, needs_packing, has_elevator);
    let max = (min * Decimal::new(22, 1)).round_dp(2);
    let (origin_city, origin_state) = extract_city_state(origin_raw);
    let (destination_city, destination_state) = extract_city_state(destination_raw);

    PriceEstimate {
        distance_km: 0.0,
        price: PriceRange::new(min, max),
        explanation: format!(
            "Estimativa genérica para {}: não foi possível calcular a distância exata, \
             então a faixa é ampla e pode variar bastante conforme o trajeto e o volume.",
            property.label()
        ),
        origin_city,
        origin_state,
        destination_city,
        destination_state,
    }
}

/// Best-effort `(city, state)` extraction from free text such as
/// "Moema SP" or "Campinas, São Paulo".
pub fn extract_city_state(raw: &str) -> (Option<String>, Option<String>) {
    let normalized = fold_accents(raw).to_lowercase();
    let tokens: Vec<&str> = normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .collect();

    if tokens.is_empty() {
        return (None, None);
    }

    // A trailing two-letter token is read as a UF code.
    if let Some(last) = tokens.last() {
        if let Some((code, _)) = STATE_CODES
            .iter()
            .find(|(code, _)| code.eq_ignore_ascii_case(last))
        {
            let city = city_from_tokens(&tokens[..tokens.len() - 1]);
            return (city, Some((*code).to_string()));
        }
    }

    // Otherwise look for a full state name suffix.
    for (code, name) in STATE_CODES {
        if let Some(prefix) = normalized.trim_end().strip_suffix(name) {
            let city_tokens: Vec<&str> = prefix
                .split(|c: char| !c.is_alphanumeric())
                .filter(|token| !token.is_empty())
                .collect();
            return (city_from_tokens(&city_tokens), Some((*code).to_string()));
        }
    }

    (city_from_tokens(&tokens), None)
}

fn city_from_tokens(tokens: &[&str]) -> Option<String> {
    if tokens.is_empty() {
        return None;
    }
    let city = tokens
        .iter()
        .map(|token| capitalize(token))
        .collect::<Vec<_>>()
        .join(" ");
    Some(city)
}

fn capitalize(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn fold_accents(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
            'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
            'Ç' => 'C',
            other => other,
        })
        .collect()
}

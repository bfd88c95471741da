use mudey_core::domain::request::PropertyType;
use mudey_core::pricing::PricingPolicy;

/// Everything the completion service needs to price one move.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EstimateInput {
    pub origin_raw: String,
    pub destination_raw: String,
    pub property_type: PropertyType,
    pub has_elevator: bool,
    pub needs_packing: bool,
}

impl From<&mudey_core::domain::session::CompletedIntake> for EstimateInput {
    fn from(intake: &mudey_core::domain::session::CompletedIntake) -> Self {
        Self {
            origin_raw: intake.origin_raw.clone(),
            destination_raw: intake.destination_raw.clone(),
            property_type: intake.property_type,
            has_elevator: intake.has_elevator,
            needs_packing: intake.needs_packing,
        }
    }
}

/// Builds the estimation prompt. Pure: same input, same prompt.
///
/// The prompt carries the deterministic pricing heuristics so the model
/// prices with the same table the floor computation uses, and demands a
/// single JSON object so the response can be parsed mechanically.
pub fn build_prompt(input: &EstimateInput, policy: &PricingPolicy) -> String {
    let elevator = if input.has_elevator { "com elevador" } else { "sem elevador" };
    let packing = if input.needs_packing {
        "o cliente precisa do serviço de embalagem"
    } else {
        "o cliente não precisa de embalagem"
    };

    format!(
        "Você é um orçamentista de mudanças residenciais no Brasil.\n\
         Interprete os endereços abaixo mesmo com erros de digitação ou abreviações \
         (ex.: \"sp\" = São Paulo, \"bh\" = Belo Horizonte) e identifique cidade e UF de cada um.\n\
         \n\
         Origem: {origin}\n\
         Destino: {destination}\n\
         Imóvel: {property} ({elevator}); {packing}.\n\
         \n\
         Regras de preço:\n\
         - custo base para {property}: R$ {base}\n\
         - combustível e pedágio: R$ {per_km} por km rodado\n\
         - embalagem completa: acréscimo de {packing_pct}% sobre o custo base\n\
         - sem elevador: acréscimo de {elevator_pct}% sobre o custo base\n\
         - viagens acima de {overnight_km} km: acréscimo de R$ {overnight} de pernoite\n\
         \n\
         Estime a distância rodoviária em km entre origem e destino e calcule uma faixa \
         de preço realista (minimo e maximo) em reais.\n\
         \n\
         Responda com UM ÚNICO objeto JSON, sem texto antes ou depois, no formato:\n\
         {{\"distanceKm\": number, \"precoMin\": number, \"precoMax\": number, \
         \"explicacao\": string, \"cidadeOrigem\": string, \"estadoOrigem\": string, \
         \"cidadeDestino\": string, \"estadoDestino\": string}}",
        origin = input.origin_raw,
        destination = input.destination_raw,
        property = input.property_type.label(),
        base = policy.base_cost(input.property_type),
        per_km = policy.per_km_cost,
        packing_pct = policy.packing_surcharge_pct * rust_decimal::Decimal::from(100),
        elevator_pct = policy.no_elevator_surcharge_pct * rust_decimal::Decimal::from(100),
        overnight_km = policy.overnight_threshold_km,
        overnight = policy.overnight_surcharge,
    )
}

#[cfg(test)]
mod tests {
    use mudey_core::domain::request::PropertyType;
    use mudey_core::pricing::PricingPolicy;

    use super::{build_prompt, EstimateInput};

    fn input() -> EstimateInput {
        EstimateInput {
            origin_raw: "Moema SP".to_string(),
            destination_raw: "Santana SP".to_string(),
            property_type: PropertyType::TwoBedrooms,
            has_elevator: false,
            needs_packing: true,
        }
    }

    #[test]
    fn prompt_is_deterministic() {
        let policy = PricingPolicy::default();
        assert_eq!(build_prompt(&input(), &policy), build_prompt(&input(), &policy));
    }

    #[test]
    fn prompt_encodes_addresses_and_heuristics() {
        let prompt = build_prompt(&input(), &PricingPolicy::default());

        assert!(prompt.contains("Moema SP"));
        assert!(prompt.contains("Santana SP"));
        assert!(prompt.contains("2 quartos"));
        assert!(prompt.contains("sem elevador"));
        assert!(prompt.contains("precisa do serviço de embalagem"));
        assert!(prompt.contains("pernoite"));
        assert!(prompt.contains("precoMin"));
        assert!(prompt.contains("estadoDestino"));
    }
}

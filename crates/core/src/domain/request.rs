use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

/// Minimum relative spread between the low and high end of a price range.
pub const MIN_PRICE_MARGIN: Decimal = Decimal::from_parts(13, 0, 0, false, 1); // 1.3

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Studio,
    OneBedroom,
    TwoBedrooms,
    ThreeBedrooms,
    FourPlusBedrooms,
    Office,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Studio => "studio",
            Self::OneBedroom => "one_bedroom",
            Self::TwoBedrooms => "two_bedrooms",
            Self::ThreeBedrooms => "three_bedrooms",
            Self::FourPlusBedrooms => "four_plus_bedrooms",
            Self::Office => "office",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "studio" | "kitnet" | "kitinete" | "quitinete" | "property.studio" => {
                Some(Self::Studio)
            }
            "one_bedroom" | "1 quarto" | "um quarto" | "property.one_bedroom" => {
                Some(Self::OneBedroom)
            }
            "two_bedrooms" | "2 quartos" | "dois quartos" | "property.two_bedrooms" => {
                Some(Self::TwoBedrooms)
            }
            "three_bedrooms" | "3 quartos" | "tres quartos" | "três quartos"
            | "property.three_bedrooms" => Some(Self::ThreeBedrooms),
            "four_plus_bedrooms" | "4 quartos" | "4+ quartos" | "casa grande"
            | "property.four_plus_bedrooms" => Some(Self::FourPlusBedrooms),
            "office" | "escritorio" | "escritório" | "comercial" | "property.office" => {
                Some(Self::Office)
            }
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Studio => "Kitnet/Studio",
            Self::OneBedroom => "1 quarto",
            Self::TwoBedrooms => "2 quartos",
            Self::ThreeBedrooms => "3 quartos",
            Self::FourPlusBedrooms => "4+ quartos",
            Self::Office => "Escritório",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    WhatsApp,
    Web,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WhatsApp => "whatsapp",
            Self::Web => "web",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "whatsapp" => Some(Self::WhatsApp),
            "web" => Some(Self::Web),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: Decimal,
    pub max: Decimal,
}

impl PriceRange {
    pub fn new(min: Decimal, max: Decimal) -> Self {
        Self { min, max }
    }

    /// True when the high end is at least `min * MIN_PRICE_MARGIN`.
    pub fn honors_margin(&self) -> bool {
        self.max >= self.min * MIN_PRICE_MARGIN
    }
}

/// The durable record of a completed intake.
///
/// Created once when the conversation finishes; downstream systems own any
/// later mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub id: RequestId,
    pub contact: ContactInfo,
    pub origin_raw: String,
    pub destination_raw: String,
    pub origin_city: Option<String>,
    pub origin_state: Option<String>,
    pub destination_city: Option<String>,
    pub destination_state: Option<String>,
    pub property_type: PropertyType,
    pub has_elevator: bool,
    pub needs_packing: bool,
    pub move_date: Option<NaiveDate>,
    pub extra_items: Option<String>,
    pub distance_km: Option<f64>,
    pub price: Option<PriceRange>,
    pub explanation: Option<String>,
    pub channel: Channel,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl QuoteRequest {
    /// Checks the record-level invariants: distance and price travel
    /// together, and a present price honors the minimum margin.
    pub fn validate(&self) -> Result<(), DomainError> {
        match (&self.distance_km, &self.price) {
            (Some(_), Some(price)) => {
                if !price.honors_margin() {
                    return Err(DomainError::InvariantViolation(format!(
                        "price range {} - {} does not honor the minimum margin",
                        price.min, price.max
                    )));
                }
            }
            (None, None) => {}
            _ => {
                return Err(DomainError::InvariantViolation(
                    "distance and price must be present together or both absent".to_string(),
                ));
            }
        }

        if self.contact.email.trim().is_empty() {
            return Err(DomainError::MissingField("contact.email".to_string()));
        }

        Ok(())
    }
}

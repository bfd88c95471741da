use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

use mudey_core::domain::campaign::Company;
use mudey_core::domain::request::QuoteRequest;

const LEAD_TEMPLATE: &str = include_str!("templates/lead_notification.html");

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template render failed: {0}")]
    Render(#[from] tera::Error),
}

/// Values interpolated into the lead notification body.
#[derive(Clone, Debug, Serialize)]
pub struct LeadEmailContext {
    pub company_name: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub origin: String,
    pub destination: String,
    pub property_label: String,
    pub has_elevator: bool,
    pub needs_packing: bool,
    pub move_date: Option<String>,
    pub extra_items: Option<String>,
    pub price_min: String,
    pub price_max: String,
    pub explanation: Option<String>,
    pub portal_link: String,
}

impl LeadEmailContext {
    pub fn build(request: &QuoteRequest, company: &Company, portal_link: String) -> Self {
        let (price_min, price_max) = match &request.price {
            Some(price) => (format!("{:.2}", price.min), format!("{:.2}", price.max)),
            None => ("-".to_string(), "-".to_string()),
        };

        Self {
            company_name: company.name.clone(),
            customer_name: request.contact.name.clone(),
            customer_email: request.contact.email.clone(),
            customer_phone: request.contact.phone.clone(),
            origin: request.origin_raw.clone(),
            destination: request.destination_raw.clone(),
            property_label: request.property_type.label().to_string(),
            has_elevator: request.has_elevator,
            needs_packing: request.needs_packing,
            move_date: request.move_date.map(|date| date.format("%d/%m/%Y").to_string()),
            extra_items: request.extra_items.clone(),
            price_min,
            price_max,
            explanation: request.explanation.clone(),
            portal_link,
        }
    }
}

/// Renders the HTML body of a lead notification.
pub fn render_lead_email(context: &LeadEmailContext) -> Result<String, TemplateError> {
    let values = Context::from_serialize(context)?;
    Ok(Tera::one_off(LEAD_TEMPLATE, &values, true)?)
}

/// Subject line for a lead notification.
pub fn lead_subject(request: &QuoteRequest) -> String {
    format!(
        "Novo lead de mudança: {} para {}",
        request.origin_raw, request.destination_raw
    )
}

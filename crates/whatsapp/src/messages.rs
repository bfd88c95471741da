use serde::Serialize;

use mudey_core::domain::request::PriceRange;
use mudey_core::intake::IntakeStep;

/// One option behind an interactive reply button.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ButtonOption {
    pub id: String,
    pub title: String,
}

impl ButtonOption {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self { id: id.into(), title: title.into() }
    }
}

/// One row of an interactive list message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ListOption {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ListOption {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self { id: id.into(), title: title.into(), description: None }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Outbound channel message: plain text, reply buttons, or a list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Text { body: String },
    Buttons { body: String, buttons: Vec<ButtonOption> },
    List { body: String, button_label: String, options: Vec<ListOption> },
}

impl OutboundMessage {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    pub fn buttons(body: impl Into<String>, buttons: Vec<ButtonOption>) -> Self {
        Self::Buttons { body: body.into(), buttons }
    }

    pub fn list(
        body: impl Into<String>,
        button_label: impl Into<String>,
        options: Vec<ListOption>,
    ) -> Self {
        Self::List { body: body.into(), button_label: button_label.into(), options }
    }

    /// Plain-text rendering used for logging and fallback transports.
    pub fn fallback_text(&self) -> &str {
        match self {
            Self::Text { body } | Self::Buttons { body, .. } | Self::List { body, .. } => body,
        }
    }
}

fn yes_no_buttons(prefix: &str) -> Vec<ButtonOption> {
    vec![
        ButtonOption::new(format!("{prefix}.yes"), "Sim"),
        ButtonOption::new(format!("{prefix}.no"), "Não"),
    ]
}

/// The question asked when a session enters `step`.
pub fn prompt_for_step(step: IntakeStep) -> OutboundMessage {
    match step {
        IntakeStep::Origin => OutboundMessage::text(
            "Vamos montar seu orçamento de mudança! 📦\n\
             De onde você está saindo? (bairro/cidade, ex.: Moema SP)",
        ),
        IntakeStep::Destination => {
            OutboundMessage::text("Para onde vai a mudança? (bairro/cidade)")
        }
        IntakeStep::PropertyType => OutboundMessage::list(
            "Qual o tipo do imóvel atual?",
            "Escolher",
            vec![
                ListOption::new("property.studio", "Kitnet/Studio"),
                ListOption::new("property.one_bedroom", "1 quarto"),
                ListOption::new("property.two_bedrooms", "2 quartos"),
                ListOption::new("property.three_bedrooms", "3 quartos"),
                ListOption::new("property.four_plus_bedrooms", "4+ quartos"),
                ListOption::new("property.office", "Escritório"),
            ],
        ),
        IntakeStep::Elevator => {
            OutboundMessage::buttons("O prédio tem elevador?", yes_no_buttons("elevator"))
        }
        IntakeStep::Packing => OutboundMessage::buttons(
            "Você precisa do serviço de embalagem?",
            yes_no_buttons("packing"),
        ),
        IntakeStep::Name => OutboundMessage::text("Qual é o seu nome?"),
        IntakeStep::Email => {
            OutboundMessage::text("Qual e-mail devemos usar para enviar as propostas?")
        }
        IntakeStep::MoveDate => OutboundMessage::buttons(
            "Já tem data para a mudança? Envie como dd/mm/aaaa, ou pule por enquanto.",
            vec![ButtonOption::new("date.skip", "Pular")],
        ),
        IntakeStep::ExtraInfoChoice => OutboundMessage::buttons(
            "Quer listar itens especiais (piano, cofre, objetos frágeis)?",
            yes_no_buttons("extra"),
        ),
        IntakeStep::ExtraInfoText => {
            OutboundMessage::text("Pode listar os itens especiais em uma mensagem.")
        }
    }
}

/// Closing message with the computed range and the notified companies.
pub fn summary_message(
    price: &PriceRange,
    explanation: &str,
    notified: &[String],
) -> OutboundMessage {
    let companies = match notified {
        [] => "Nenhuma transportadora ativa atende sua região no momento, mas seu pedido ficou registrado.".to_string(),
        [only] => format!("1 transportadora parceira vai entrar em contato com você: {only}."),
        names => format!(
            "{} transportadoras parceiras vão entrar em contato com você: {}.",
            names.len(),
            names.join(", ")
        ),
    };

    OutboundMessage::text(format!(
        "Pronto! 🎉 Sua estimativa: R$ {:.2} a R$ {:.2}.\n{explanation}\n\n{companies}",
        price.min, price.max
    ))
}

pub fn reprompt_message(hint: &str) -> OutboundMessage {
    OutboundMessage::text(hint)
}

pub fn throttled_message(retry_after_secs: u64) -> OutboundMessage {
    OutboundMessage::text(format!(
        "Você enviou muitas mensagens em pouco tempo. Aguarde {retry_after_secs} segundos e tente novamente."
    ))
}

pub fn duplicate_message() -> OutboundMessage {
    OutboundMessage::text(
        "Já recebemos um pedido igual a esse há pouco. As transportadoras parceiras já estão com seus dados; aguarde o contato delas.",
    )
}

pub fn failure_message() -> OutboundMessage {
    OutboundMessage::text(
        "Tivemos um problema ao finalizar seu orçamento. 😕 Envie \"oi\" para começar de novo.",
    )
}

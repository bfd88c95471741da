use chrono::NaiveDate;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::request::PropertyType;
use crate::domain::session::IntakeSession;
use crate::intake::states::{AnswerInput, IntakeStep, TurnOutcome};
use crate::validate::{is_valid_email, normalize_move_date};

/// Messages that open a new intake conversation. Anything else, without an
/// active session, is ignored so the pipeline never talks to bystanders.
const ACTIVATION_KEYWORDS: &[&str] = &[
    "oi",
    "ola",
    "olá",
    "bom dia",
    "boa tarde",
    "boa noite",
    "orcamento",
    "orçamento",
    "cotacao",
    "cotação",
    "mudanca",
    "mudança",
    "quote",
    "start",
    "comecar",
    "começar",
];

const YES_TOKENS: &[&str] = &["sim", "s", "yes", "tem", "possui", "preciso", "quero"];
const NO_TOKENS: &[&str] = &["nao", "não", "n", "no", "sem", "nenhum"];

/// Pure turn-by-turn intake logic. Validation failures never escape a
/// turn: every answer resolves to advance, reprompt, or completion.
#[derive(Clone, Copy, Debug, Default)]
pub struct IntakeFlow;

impl IntakeFlow {
    pub fn new() -> Self {
        Self
    }

    pub fn initial_step(&self) -> IntakeStep {
        IntakeStep::Origin
    }

    /// True when `text` should open a session for an identity without one.
    pub fn is_activation(&self, text: &str) -> bool {
        let normalized = text.trim().to_lowercase();
        let normalized = normalized.trim_end_matches(['!', '.', '?']);
        ACTIVATION_KEYWORDS.contains(&normalized)
    }

    /// Applies one answer to the session, mutating the draft in place.
    pub fn apply(
        &self,
        session: &mut IntakeSession,
        input: &AnswerInput,
        today: NaiveDate,
    ) -> TurnOutcome {
        let raw = input.raw().trim();

        match session.step {
            IntakeStep::Origin => {
                if raw.len() < 3 {
                    return reprompt("Me diga o endereço ou bairro/cidade de origem da mudança.");
                }
                session.draft.origin_raw = Some(raw.to_string());
                self.advance(session)
            }
            IntakeStep::Destination => {
                if raw.len() < 3 {
                    return reprompt("Me diga o endereço ou bairro/cidade de destino.");
                }
                session.draft.destination_raw = Some(raw.to_string());
                self.advance(session)
            }
            IntakeStep::PropertyType => match PropertyType::parse(raw) {
                Some(property) => {
                    session.draft.property_type = Some(property);
                    self.advance(session)
                }
                None => reprompt(
                    "Escolha o tipo de imóvel: Kitnet/Studio, 1 quarto, 2 quartos, 3 quartos, 4+ quartos ou Escritório.",
                ),
            },
            IntakeStep::Elevator => match parse_yes_no(input, "elevator") {
                Some(has_elevator) => {
                    session.draft.has_elevator = Some(has_elevator);
                    self.advance(session)
                }
                None => reprompt("O prédio tem elevador? Responda sim ou não."),
            },
            IntakeStep::Packing => match parse_yes_no(input, "packing") {
                Some(needs_packing) => {
                    session.draft.needs_packing = Some(needs_packing);
                    self.advance(session)
                }
                None => reprompt("Você precisa do serviço de embalagem? Responda sim ou não."),
            },
            IntakeStep::Name => {
                if raw.len() < 2 {
                    return reprompt("Qual é o seu nome?");
                }
                session.draft.name = Some(raw.to_string());
                self.advance(session)
            }
            IntakeStep::Email => {
                if !is_valid_email(raw) {
                    return reprompt(
                        "Esse e-mail não parece válido. Envie no formato nome@dominio.com.",
                    );
                }
                session.draft.email = Some(raw.to_lowercase());
                self.advance(session)
            }
            IntakeStep::MoveDate => match normalize_move_date(raw, today) {
                Ok(date) => {
                    session.draft.move_date = date;
                    self.advance(session)
                }
                Err(error) => reprompt(format!(
                    "{error}. Envie a data como dd/mm/aaaa, ou responda \"pular\".",
                )),
            },
            IntakeStep::ExtraInfoChoice => match parse_yes_no(input, "extra") {
                Some(true) => {
                    session.step = IntakeStep::ExtraInfoText;
                    TurnOutcome::Advanced { to: IntakeStep::ExtraInfoText }
                }
                Some(false) => TurnOutcome::Completed,
                None => reprompt(
                    "Quer listar itens especiais (piano, cofre, objetos frágeis)? Responda sim ou não.",
                ),
            },
            IntakeStep::ExtraInfoText => {
                if !raw.is_empty() {
                    session.draft.extra_items = Some(raw.to_string());
                }
                TurnOutcome::Completed
            }
        }
    }

    /// Same as [`apply`], emitting one audit event per turn.
    pub fn apply_with_audit<S>(
        &self,
        session: &mut IntakeSession,
        input: &AnswerInput,
        today: NaiveDate,
        sink: &S,
        audit: &AuditContext,
    ) -> TurnOutcome
    where
        S: AuditSink + ?Sized,
    {
        let from = session.step;
        let outcome = self.apply(session, input, today);

        let (event_type, audit_outcome) = match &outcome {
            TurnOutcome::Advanced { .. } => ("intake.step_advanced", AuditOutcome::Success),
            TurnOutcome::Reprompt { .. } => ("intake.answer_rejected", AuditOutcome::Rejected),
            TurnOutcome::Completed => ("intake.completed", AuditOutcome::Success),
        };

        let mut event = AuditEvent::new(
            audit.request_id.clone(),
            audit.identity.clone(),
            audit.correlation_id.clone(),
            event_type,
            AuditCategory::Intake,
            audit.actor.clone(),
            audit_outcome,
        )
        .with_metadata("from", from.as_str());
        if let TurnOutcome::Advanced { to } = &outcome {
            event = event.with_metadata("to", to.as_str());
        }
        sink.emit(event);

        outcome
    }

    fn advance(&self, session: &mut IntakeSession) -> TurnOutcome {
        match session.step.next() {
            Some(next) => {
                session.step = next;
                TurnOutcome::Advanced { to: next }
            }
            None => TurnOutcome::Completed,
        }
    }
}

fn reprompt(hint: impl Into<String>) -> TurnOutcome {
    TurnOutcome::Reprompt { hint: hint.into() }
}

/// Accepts option ids (`elevator.yes`) from button replies as well as
/// plain yes/no text.
fn parse_yes_no(input: &AnswerInput, option_prefix: &str) -> Option<bool> {
    if let AnswerInput::Option(id) = input {
        if let Some(answer) = id.strip_prefix(option_prefix).and_then(|s| s.strip_prefix('.')) {
            return match answer {
                "yes" => Some(true),
                "no" => Some(false),
                _ => None,
            };
        }
    }

    let normalized = input.raw().trim().to_lowercase();
    if YES_TOKENS.contains(&normalized.as_str()) {
        Some(true)
    } else if NO_TOKENS.contains(&normalized.as_str()) {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::request::PropertyType;
    use crate::domain::session::IntakeSession;
    use crate::intake::states::{AnswerInput, IntakeStep, TurnOutcome};

    use super::IntakeFlow;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).expect("valid fixture date")
    }

    fn text(value: &str) -> AnswerInput {
        AnswerInput::Text(value.to_string())
    }

    fn option(value: &str) -> AnswerInput {
        AnswerInput::Option(value.to_string())
    }

    #[test]
    fn activation_keywords_are_recognized() {
        let flow = IntakeFlow::new();
        assert!(flow.is_activation("oi"));
        assert!(flow.is_activation("  Bom dia! "));
        assert!(flow.is_activation("ORÇAMENTO"));
        assert!(!flow.is_activation("quanto custa?"));
        assert!(!flow.is_activation("oi pessoal"));
    }

    #[test]
    fn full_walk_through_collects_every_answer() {
        let flow = IntakeFlow::new();
        let mut session = IntakeSession::start("5511987654321", Utc::now());

        let turns = [
            ("Moema SP", IntakeStep::Destination),
            ("Santana SP", IntakeStep::PropertyType),
            ("2 quartos", IntakeStep::Elevator),
            ("nao", IntakeStep::Packing),
            ("sim", IntakeStep::Name),
            ("Ana", IntakeStep::Email),
            ("ana@x.com", IntakeStep::MoveDate),
        ];
        for (answer, expected_next) in turns {
            let outcome = flow.apply(&mut session, &text(answer), today());
            assert_eq!(outcome, TurnOutcome::Advanced { to: expected_next }, "answer: {answer}");
        }

        let outcome = flow.apply(&mut session, &text("pular"), today());
        assert_eq!(outcome, TurnOutcome::Advanced { to: IntakeStep::ExtraInfoChoice });

        let outcome = flow.apply(&mut session, &text("nao"), today());
        assert_eq!(outcome, TurnOutcome::Completed);

        let completed = session.draft.try_finish().expect("all required answers collected");
        assert_eq!(completed.property_type, PropertyType::TwoBedrooms);
        assert!(!completed.has_elevator);
        assert!(completed.needs_packing);
        assert_eq!(completed.email, "ana@x.com");
        assert_eq!(completed.move_date, None);
        assert_eq!(completed.extra_items, None);
    }

    #[test]
    fn extra_info_branch_captures_free_text() {
        let flow = IntakeFlow::new();
        let mut session = IntakeSession::start("id", Utc::now());
        session.step = IntakeStep::ExtraInfoChoice;

        let outcome = flow.apply(&mut session, &option("extra.yes"), today());
        assert_eq!(outcome, TurnOutcome::Advanced { to: IntakeStep::ExtraInfoText });

        let outcome = flow.apply(&mut session, &text("piano de cauda"), today());
        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(session.draft.extra_items.as_deref(), Some("piano de cauda"));
    }

    #[test]
    fn invalid_answer_reprompts_without_advancing() {
        let flow = IntakeFlow::new();
        let mut session = IntakeSession::start("id", Utc::now());
        session.step = IntakeStep::PropertyType;

        let outcome = flow.apply(&mut session, &text("mansao"), today());
        assert!(matches!(outcome, TurnOutcome::Reprompt { .. }));
        assert_eq!(session.step, IntakeStep::PropertyType);
        assert_eq!(session.draft.property_type, None);
    }

    #[test]
    fn malformed_email_reprompts() {
        let flow = IntakeFlow::new();
        let mut session = IntakeSession::start("id", Utc::now());
        session.step = IntakeStep::Email;

        let outcome = flow.apply(&mut session, &text("ana-arroba-x"), today());
        assert!(matches!(outcome, TurnOutcome::Reprompt { .. }));
        assert_eq!(session.step, IntakeStep::Email);
    }

    #[test]
    fn impossible_date_reprompts_with_a_hint() {
        let flow = IntakeFlow::new();
        let mut session = IntakeSession::start("id", Utc::now());
        session.step = IntakeStep::MoveDate;

        let outcome = flow.apply(&mut session, &text("31/02/2025"), today());
        let TurnOutcome::Reprompt { hint } = outcome else {
            panic!("expected reprompt for impossible date");
        };
        assert!(hint.contains("pular"));
    }

    #[test]
    fn button_option_ids_answer_yes_no_steps() {
        let flow = IntakeFlow::new();
        let mut session = IntakeSession::start("id", Utc::now());
        session.step = IntakeStep::Elevator;

        let outcome = flow.apply(&mut session, &option("elevator.yes"), today());
        assert_eq!(outcome, TurnOutcome::Advanced { to: IntakeStep::Packing });
        assert_eq!(session.draft.has_elevator, Some(true));
    }

    #[test]
    fn turns_emit_audit_events() {
        let flow = IntakeFlow::new();
        let sink = InMemoryAuditSink::default();
        let mut session = IntakeSession::start("5511987654321", Utc::now());

        let _ = flow.apply_with_audit(
            &mut session,
            &text("Moema SP"),
            today(),
            &sink,
            &AuditContext::new(None, Some("5511987654321".to_string()), "corr-1", "intake-engine"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "intake.step_advanced");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("destination"));
    }
}

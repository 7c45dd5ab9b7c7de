//! Pomodoro machine - the session state machine.
//!
//! Machines are pure decision makers: (record, event) in, transition out.
//! NO IO, NO async. The caller supplies `now` so decisions replay deterministically.
//!
//! ```text
//! IDLE --/start--> WAITING_FOR_DURATION --duration:N--> ritual[0] .. ritual[n-1]
//!   --> WORKING --timer/stop--> WAITING_FOR_EXTENSION --extension:N--> WORKING
//!                                      |
//!                                      +--extension:finish--> reflection[0] .. reflection[m-1]
//!                                                               --> commit, delete record
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::commands::{NextRecord, OutboundMessage, PomodoroCommand, Transition};
use super::events::PomodoroEvent;
use super::models::{CompletedSession, SessionRecord, SessionStatus};
use super::script::{with_minutes, StepScript};

#[derive(Debug, Clone)]
pub struct PomodoroMachine {
    script: Arc<StepScript>,
}

impl PomodoroMachine {
    pub fn new(script: Arc<StepScript>) -> Self {
        Self { script }
    }

    pub fn script(&self) -> &StepScript {
        &self.script
    }

    pub fn decide(
        &self,
        record: &SessionRecord,
        event: &PomodoroEvent,
        now: DateTime<Utc>,
    ) -> Transition {
        let messages = &self.script.messages;

        match (record.status, event) {
            // =================================================================
            // Commands valid in any state
            // =================================================================
            (_, PomodoroEvent::Restart) => self.restart(record),

            (SessionStatus::Working, PomodoroEvent::Stop) => {
                self.end_work(record, &messages.stopped, true, now)
            }
            (_, PomodoroEvent::Stop) => Transition {
                next: NextRecord::Unchanged,
                commands: vec![send_text(&messages.nothing_to_stop)],
            },

            // =================================================================
            // Timer
            // =================================================================
            (SessionStatus::Working, PomodoroEvent::TimerFired) => {
                self.end_work(record, &messages.time_up, false, now)
            }

            // =================================================================
            // Duration selection
            // =================================================================
            (SessionStatus::WaitingForDuration, PomodoroEvent::Choice { token }) => {
                match self.script.parse_duration(token) {
                    Some(minutes) => self.enter_ritual(&record.with_duration(minutes), 0, now),
                    None => Transition::ignored(),
                }
            }

            // =================================================================
            // Ritual and reflection answers
            // =================================================================
            (SessionStatus::Ritual(index), event) => {
                let Some(step) = self.script.ritual.get(index) else {
                    return Transition::ignored();
                };
                if record.has_answer(&step.field_key) {
                    return Transition::ignored();
                }
                match step.answer(event) {
                    Some(value) => self.enter_ritual(
                        &record.with_ritual_answer(&step.field_key, value),
                        index + 1,
                        now,
                    ),
                    None => Transition::ignored(),
                }
            }

            (SessionStatus::Reflection(index), event) => {
                let Some(step) = self.script.reflection.get(index) else {
                    return Transition::ignored();
                };
                if record.has_answer(&step.field_key) {
                    return Transition::ignored();
                }
                match step.answer(event) {
                    Some(value) => self.enter_reflection(
                        &record.with_reflection_answer(&step.field_key, value),
                        index + 1,
                        now,
                    ),
                    None => Transition::ignored(),
                }
            }

            // =================================================================
            // Finish or extend
            // =================================================================
            (SessionStatus::WaitingForExtension, PomodoroEvent::Choice { token }) => {
                if self.script.is_finish_token(token) {
                    return self.enter_reflection(record, 0, now);
                }
                match self.script.parse_extension(token) {
                    Some(minutes) => Transition::save(
                        record.working(now),
                        vec![
                            PomodoroCommand::ScheduleTimer { minutes },
                            send_text(&with_minutes(&messages.extended, minutes)),
                        ],
                    ),
                    None => Transition::ignored(),
                }
            }

            _ => Transition::ignored(),
        }
    }

    fn restart(&self, record: &SessionRecord) -> Transition {
        let mut commands = Vec::new();
        if record.status == SessionStatus::Working {
            if let Some(handle) = &record.timer_handle {
                commands.push(PomodoroCommand::CancelTimer {
                    handle: handle.clone(),
                });
            }
        }
        commands.push(PomodoroCommand::Send(OutboundMessage::Choice {
            text: self.script.messages.duration_prompt.clone(),
            buttons: self.script.duration_buttons(),
        }));

        Transition::save(SessionRecord::waiting_for_duration(record.chat_id), commands)
    }

    /// Move to ritual step `index`, or start work once the ritual is exhausted.
    fn enter_ritual(&self, record: &SessionRecord, index: usize, now: DateTime<Utc>) -> Transition {
        match self.script.ritual.get(index) {
            Some(step) => Transition::save(
                record.at(SessionStatus::Ritual(index)),
                vec![PomodoroCommand::Send(OutboundMessage::prompt(step))],
            ),
            None => self.start_work(record, now),
        }
    }

    fn start_work(&self, record: &SessionRecord, now: DateTime<Utc>) -> Transition {
        let Some(minutes) = record.duration else {
            return Transition::ignored();
        };

        Transition::save(
            record.working(now),
            vec![
                PomodoroCommand::ScheduleTimer { minutes },
                send_text(&with_minutes(&self.script.messages.timer_started, minutes)),
            ],
        )
    }

    /// Leave WORKING via the timer or `/stop`.
    fn end_work(
        &self,
        record: &SessionRecord,
        text: &str,
        cancel: bool,
        now: DateTime<Utc>,
    ) -> Transition {
        let mut commands = Vec::new();
        if cancel {
            if let Some(handle) = &record.timer_handle {
                commands.push(PomodoroCommand::CancelTimer {
                    handle: handle.clone(),
                });
            }
        }

        if !self.script.extensions.is_empty() {
            commands.push(PomodoroCommand::Send(OutboundMessage::Choice {
                text: text.to_string(),
                buttons: self.script.extension_buttons(),
            }));
            return Transition::save(
                record.timer_cleared(SessionStatus::WaitingForExtension),
                commands,
            );
        }

        commands.push(send_text(text));
        let mut next = self.enter_reflection(
            &record.timer_cleared(SessionStatus::WaitingForExtension),
            0,
            now,
        );
        commands.append(&mut next.commands);
        Transition {
            next: next.next,
            commands,
        }
    }

    /// Move to reflection step `index`, or complete once reflection is exhausted.
    fn enter_reflection(
        &self,
        record: &SessionRecord,
        index: usize,
        now: DateTime<Utc>,
    ) -> Transition {
        match self.script.reflection.get(index) {
            Some(step) => Transition::save(
                record.at(SessionStatus::Reflection(index)),
                vec![PomodoroCommand::Send(OutboundMessage::prompt(step))],
            ),
            None => Transition {
                next: NextRecord::Delete,
                commands: vec![
                    PomodoroCommand::CommitSession(CompletedSession::from_record(record, now)),
                    send_text(&self.script.messages.saved),
                ],
            },
        }
    }
}

fn send_text(text: &str) -> PomodoroCommand {
    PomodoroCommand::Send(OutboundMessage::text(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ChatId, TimerHandle};
    use crate::domains::pomodoro::script::Step;

    fn script() -> StepScript {
        StepScript {
            durations: vec![5, 30],
            extensions: vec![10, 15],
            ritual: vec![
                Step::text("task", "Task", "What will you do?"),
                Step::choice(
                    "role",
                    "Role",
                    "Which role?",
                    &[("Engineer", "engineer"), ("Writer", "writer")],
                ),
            ],
            reflection: vec![Step::text("outcome", "Outcome", "What did you do?")],
            messages: Default::default(),
        }
    }

    fn machine() -> PomodoroMachine {
        PomodoroMachine::new(Arc::new(script()))
    }

    fn choice(token: &str) -> PomodoroEvent {
        PomodoroEvent::Choice {
            token: token.to_string(),
        }
    }

    fn text(value: &str) -> PomodoroEvent {
        PomodoroEvent::Text {
            value: value.to_string(),
        }
    }

    fn saved(transition: &Transition) -> &SessionRecord {
        match &transition.next {
            NextRecord::Save(record) => record,
            other => panic!("expected save, got {:?}", other),
        }
    }

    fn working_record() -> SessionRecord {
        SessionRecord::waiting_for_duration(ChatId(42))
            .with_duration(30)
            .with_ritual_answer("task", "write".into())
            .with_ritual_answer("role", "engineer".into())
            .working(Utc::now())
            .with_timer(TimerHandle::new("t-1"))
    }

    #[test]
    fn test_restart_from_idle_prompts_for_duration() {
        let t = machine().decide(&SessionRecord::idle(ChatId(42)), &PomodoroEvent::Restart, Utc::now());

        assert_eq!(saved(&t), &SessionRecord::waiting_for_duration(ChatId(42)));
        assert_eq!(t.cancels().count(), 0);
        match t.messages().next() {
            Some(OutboundMessage::Choice { buttons, .. }) => {
                assert_eq!(buttons.len(), 2);
                assert_eq!(buttons[1].token, "duration:30");
            }
            other => panic!("expected duration prompt, got {:?}", other),
        };
    }

    #[test]
    fn test_restart_from_working_cancels_once_and_clears_fields() {
        let t = machine().decide(&working_record(), &PomodoroEvent::Restart, Utc::now());

        let cancels: Vec<_> = t.cancels().collect();
        assert_eq!(cancels, vec![&TimerHandle::new("t-1")]);
        let next = saved(&t);
        assert_eq!(next.status, SessionStatus::WaitingForDuration);
        assert!(next.ritual_answers.is_empty());
        assert!(next.duration.is_none() && next.started_at.is_none());
    }

    #[test]
    fn test_duration_choice_enters_first_ritual_step() {
        let record = SessionRecord::waiting_for_duration(ChatId(42));
        let t = machine().decide(&record, &choice("duration:30"), Utc::now());

        let next = saved(&t);
        assert_eq!(next.status, SessionStatus::Ritual(0));
        assert_eq!(next.duration, Some(30));
        assert_eq!(
            t.messages().next(),
            Some(&OutboundMessage::text("What will you do?"))
        );
    }

    #[test]
    fn test_unknown_duration_is_ignored() {
        let record = SessionRecord::waiting_for_duration(ChatId(42));
        assert!(machine()
            .decide(&record, &choice("duration:31"), Utc::now())
            .is_ignored());
        assert!(machine()
            .decide(&record, &text("30"), Utc::now())
            .is_ignored());
    }

    #[test]
    fn test_choice_only_step_ignores_text() {
        let record = SessionRecord::waiting_for_duration(ChatId(42))
            .with_duration(30)
            .with_ritual_answer("task", "write".into())
            .at(SessionStatus::Ritual(1));

        assert!(machine()
            .decide(&record, &text("engineer"), Utc::now())
            .is_ignored());
        assert!(machine()
            .decide(&record, &choice("role:astronaut"), Utc::now())
            .is_ignored());
    }

    #[test]
    fn test_last_ritual_answer_starts_work() {
        let now = Utc::now();
        let record = SessionRecord::waiting_for_duration(ChatId(42))
            .with_duration(30)
            .with_ritual_answer("task", "write".into())
            .at(SessionStatus::Ritual(1));

        let t = machine().decide(&record, &choice("role:engineer"), now);

        let next = saved(&t);
        assert_eq!(next.status, SessionStatus::Working);
        assert_eq!(next.started_at, Some(now));
        assert_eq!(next.ritual_answers["role"], "engineer");
        assert_eq!(t.schedule(), Some(30));
    }

    #[test]
    fn test_timer_fired_offers_extension_without_cancel() {
        let t = machine().decide(&working_record(), &PomodoroEvent::TimerFired, Utc::now());

        let next = saved(&t);
        assert_eq!(next.status, SessionStatus::WaitingForExtension);
        assert!(next.timer_handle.is_none());
        assert_eq!(t.cancels().count(), 0);
        match t.messages().next() {
            Some(OutboundMessage::Choice { buttons, .. }) => {
                assert_eq!(buttons[0].token, "extension:finish");
            }
            other => panic!("expected extension prompt, got {:?}", other),
        };
    }

    #[test]
    fn test_timer_fired_outside_working_is_silent() {
        let record = working_record().timer_cleared(SessionStatus::WaitingForExtension);
        assert!(machine()
            .decide(&record, &PomodoroEvent::TimerFired, Utc::now())
            .is_ignored());
        assert!(machine()
            .decide(&SessionRecord::idle(ChatId(1)), &PomodoroEvent::TimerFired, Utc::now())
            .is_ignored());
    }

    #[test]
    fn test_stop_cancels_and_offers_extension() {
        let t = machine().decide(&working_record(), &PomodoroEvent::Stop, Utc::now());

        assert_eq!(t.cancels().count(), 1);
        assert_eq!(saved(&t).status, SessionStatus::WaitingForExtension);
    }

    #[test]
    fn test_stop_outside_working_reports_nothing_to_stop() {
        let t = machine().decide(&SessionRecord::idle(ChatId(1)), &PomodoroEvent::Stop, Utc::now());

        assert_eq!(t.next, NextRecord::Unchanged);
        assert_eq!(
            t.messages().next().map(|m| m.body()),
            Some("No active session to stop.")
        );
    }

    #[test]
    fn test_extension_keeps_duration_and_start() {
        let waiting = working_record().timer_cleared(SessionStatus::WaitingForExtension);
        let t = machine().decide(&waiting, &choice("extension:15"), Utc::now());

        let next = saved(&t);
        assert_eq!(next.status, SessionStatus::Working);
        assert_eq!(next.duration, Some(30));
        assert_eq!(next.started_at, waiting.started_at);
        assert_eq!(t.schedule(), Some(15));
    }

    #[test]
    fn test_finish_then_last_reflection_answer_completes() {
        let now = Utc::now();
        let waiting = working_record().timer_cleared(SessionStatus::WaitingForExtension);
        let t = machine().decide(&waiting, &choice("extension:finish"), now);
        let reflecting = saved(&t).clone();
        assert_eq!(reflecting.status, SessionStatus::Reflection(0));

        let t = machine().decide(&reflecting, &text("done"), now);

        assert_eq!(t.next, NextRecord::Delete);
        let completed = t.commit().expect("commit command");
        assert_eq!(completed.reflection["outcome"], "done");
        assert_eq!(completed.duration_minutes, Some(30));
        assert_eq!(completed.ended_at, now);
    }

    #[test]
    fn test_empty_extensions_skip_to_reflection() {
        let mut script = script();
        script.extensions.clear();
        let machine = PomodoroMachine::new(Arc::new(script));

        let t = machine.decide(&working_record(), &PomodoroEvent::TimerFired, Utc::now());

        let next = saved(&t);
        assert_eq!(next.status, SessionStatus::Reflection(0));
        assert!(next.timer_handle.is_none());
        let bodies: Vec<_> = t.messages().map(|m| m.body()).collect();
        assert_eq!(bodies, vec!["Time's up. What next?", "What did you do?"]);
    }

    #[test]
    fn test_zero_step_script_goes_straight_to_work_and_completion() {
        let mut script = script();
        script.ritual.clear();
        script.reflection.clear();
        let machine = PomodoroMachine::new(Arc::new(script));

        let t = machine.decide(
            &SessionRecord::waiting_for_duration(ChatId(7)),
            &choice("duration:5"),
            Utc::now(),
        );
        assert_eq!(saved(&t).status, SessionStatus::Working);
        assert_eq!(t.schedule(), Some(5));

        let waiting = saved(&t).timer_cleared(SessionStatus::WaitingForExtension);
        let t = machine.decide(&waiting, &choice("extension:finish"), Utc::now());
        assert_eq!(t.next, NextRecord::Delete);
        assert!(t.commit().is_some());
    }

    #[test]
    fn test_stale_step_index_only_recovers_via_restart() {
        let record = SessionRecord::waiting_for_duration(ChatId(42)).at(SessionStatus::Ritual(9));

        assert!(machine()
            .decide(&record, &text("anything"), Utc::now())
            .is_ignored());
        assert_eq!(
            saved(&machine().decide(&record, &PomodoroEvent::Restart, Utc::now())).status,
            SessionStatus::WaitingForDuration
        );
    }

    #[test]
    fn test_idle_ignores_text_and_choices() {
        let idle = SessionRecord::idle(ChatId(1));
        assert!(machine().decide(&idle, &text("hello"), Utc::now()).is_ignored());
        assert!(machine()
            .decide(&idle, &choice("duration:30"), Utc::now())
            .is_ignored());
    }
}

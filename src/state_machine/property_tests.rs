//! Property tests over random command sequences.
//!
//! Every state reachable through `StateMachine::apply` must keep the
//! status/helpers pairing, and every accepted command bumps the version by one.

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use proptest::prelude::*;

    use crate::state_machine::fixtures::open_case;
    use crate::state_machine::{ActorId, Command, StateMachine, TransitionRules};

    fn actor() -> impl Strategy<Value = ActorId> {
        prop_oneof![
            Just(ActorId::from("r1")),
            Just(ActorId::from("r2")),
            Just(ActorId::from("r3")),
            Just(ActorId::from("reporter-1")),
        ]
    }

    fn any_command() -> impl Strategy<Value = Command> {
        prop_oneof![
            actor().prop_map(|responder| Command::Claim { responder }),
            actor().prop_map(|responder| Command::BeginWork { responder }),
            (actor(), 0usize..4).prop_map(|(responder, photos)| Command::StatusUpdate {
                responder,
                note: "animal stable, waiting for transport".into(),
                photo_urls: (0..photos).map(|i| format!("https://img.example/{i}.jpg")).collect(),
            }),
            actor().prop_map(|responder| Command::Transfer {
                responder,
                reason: "needs equipment".into(),
            }),
            actor().prop_map(|responder| Command::Resolve { responder }),
            actor().prop_map(|reporter| Command::ReporterApprove { reporter }),
            actor().prop_map(|reporter| Command::ReporterReject {
                reporter,
                reason: "needs vet".into(),
            }),
        ]
    }

    proptest! {
        #[test]
        fn reachable_states_keep_helper_invariant(
            commands in prop::collection::vec(any_command(), 0..40)
        ) {
            let rules = TransitionRules::default();
            let mut case = open_case("prop-case");

            for command in &commands {
                match StateMachine::apply(&case, command, &rules, Utc::now()) {
                    Ok(t) => {
                        prop_assert_eq!(t.next.version(), case.version() + 1);
                        prop_assert_eq!(t.event.kind.resulting_status(), t.next.status());
                        case = t.next;
                    }
                    Err(_) => {}
                }

                prop_assert_eq!(
                    case.status().requires_helpers(),
                    !case.assigned_helpers().is_empty()
                );
                let mut helpers = case.assigned_helpers().to_vec();
                helpers.sort();
                helpers.dedup();
                prop_assert_eq!(helpers.len(), case.assigned_helpers().len());
            }
        }

        #[test]
        fn rejected_commands_leave_case_untouched(
            commands in prop::collection::vec(any_command(), 1..20)
        ) {
            let rules = TransitionRules::default();
            let mut case = open_case("prop-case");

            for command in &commands {
                let before = case.clone();
                match StateMachine::apply(&case, command, &rules, Utc::now()) {
                    Ok(t) => case = t.next,
                    Err(_) => prop_assert_eq!(&case, &before),
                }
            }
        }
    }
}

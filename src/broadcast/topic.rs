//! Topic names and the chat fan-out plan.

use crate::config::FanoutConfig;
use crate::queries::_structs::{BusId, UserId};
use crate::session::Role;

pub fn bus(bus_id: BusId) -> String {
    format!("bus:{}", bus_id)
}

pub fn user(user_id: UserId) -> String {
    format!("user:{}", user_id)
}

pub fn driver(user_id: UserId) -> String {
    format!("driver:{}", user_id)
}

/// Personal topic of an account for its role.
pub fn identity(role: Role, user_id: UserId) -> String {
    match role {
        Role::Driver => driver(user_id),
        Role::Passenger => user(user_id),
    }
}

/// Room named by an old client at connect time.
pub fn room(name: &str) -> String {
    format!("chat:{}", name)
}

/// Old-style conversation room; same key as `room("user_{u}_driver_{d}")`.
pub fn legacy_pair(user_id: UserId, driver_id: UserId) -> String {
    room(&format!("user_{}_driver_{}", user_id, driver_id))
}

#[derive(Debug, Clone, Copy)]
pub struct ChatParty {
    pub id: UserId,
    pub role: Role,
}

/// Topics one chat message goes to, in delivery order, without duplicates.
pub fn chat_targets(config: &FanoutConfig, sender: ChatParty, recipient: ChatParty) -> Vec<String> {
    let mut targets = vec![identity(recipient.role, recipient.id)];
    if config.legacy_room {
        targets.push(legacy_pair(recipient.id, sender.id));
    }
    targets.push(identity(sender.role, sender.id));
    if config.legacy_sender_echo && sender.role == Role::Passenger {
        targets.push(legacy_pair(sender.id, recipient.id));
    }

    let mut seen = Vec::with_capacity(targets.len());
    targets.retain(|t| {
        if seen.contains(t) {
            false
        } else {
            seen.push(t.clone());
            true
        }
    });
    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSENGER: ChatParty = ChatParty { id: 1, role: Role::Passenger };
    const DRIVER: ChatParty = ChatParty { id: 2, role: Role::Driver };

    #[test]
    fn test_passenger_to_driver_targets() {
        let targets = chat_targets(&FanoutConfig::default(), PASSENGER, DRIVER);
        assert_eq!(
            targets,
            vec![
                "driver:2".to_string(),
                "chat:user_2_driver_1".to_string(),
                "user:1".to_string(),
                "chat:user_1_driver_2".to_string(),
            ]
        );
    }

    #[test]
    fn test_driver_reply_has_no_legacy_echo() {
        let targets = chat_targets(&FanoutConfig::default(), DRIVER, PASSENGER);
        assert_eq!(
            targets,
            vec![
                "user:1".to_string(),
                "chat:user_1_driver_2".to_string(),
                "driver:2".to_string(),
            ]
        );
    }

    #[test]
    fn test_legacy_aliases_can_be_disabled() {
        let config = FanoutConfig {
            legacy_room: false,
            legacy_sender_echo: false,
            ..FanoutConfig::default()
        };
        assert_eq!(
            chat_targets(&config, PASSENGER, DRIVER),
            vec!["driver:2".to_string(), "user:1".to_string()]
        );
    }

    #[test]
    fn test_message_to_self_is_deduplicated() {
        let targets = chat_targets(&FanoutConfig::default(), PASSENGER, PASSENGER);
        assert_eq!(targets, vec!["user:1".to_string(), "chat:user_1_driver_1".to_string()]);
    }

    #[test]
    fn test_names() {
        assert_eq!(bus(7), "bus:7");
        assert_eq!(identity(Role::Driver, 2), "driver:2");
        assert_eq!(room("user_1_driver_2"), legacy_pair(1, 2));
    }
}

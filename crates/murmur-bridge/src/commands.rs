//! Typed command surface of the engine control plane
//!
//! One variant per engine method, replacing dispatch-by-string-name at the
//! application boundary. The set mirrors the engine's dispatch table:
//! identity, contacts, messaging, network, lifecycle.

use serde_json::{json, Value};

/// A command the application can issue to the engine.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    // Identity
    GenerateIdentity { passphrase: String },
    LoadIdentity { passphrase: String },
    ExportIdentity,
    ImportIdentity { import_data: String, passphrase: String },

    // Contacts
    AddContact {
        label: String,
        public_key: String,
        onion_address: Option<String>,
        mailbox_id: Option<String>,
    },
    RemoveContact { contact_id: String },
    ListContacts,
    VerifyContact { contact_id: String },

    // Messaging
    SendMessage { contact_id: String, text: String },
    SendVoiceMessage { contact_id: String, file_path: String },
    PollMailbox,
    GetMessages { contact_id: String },

    // Network
    GetNetworkStatus,
    ConfigureRelay { preferences: Value },
    ConfigureMailbox { address: String },

    // Lifecycle
    Shutdown,
}

impl EngineCommand {
    /// Wire method name.
    pub fn method(&self) -> &'static str {
        match self {
            EngineCommand::GenerateIdentity { .. } => "generate_identity",
            EngineCommand::LoadIdentity { .. } => "load_identity",
            EngineCommand::ExportIdentity => "export_identity",
            EngineCommand::ImportIdentity { .. } => "import_identity",
            EngineCommand::AddContact { .. } => "add_contact",
            EngineCommand::RemoveContact { .. } => "remove_contact",
            EngineCommand::ListContacts => "list_contacts",
            EngineCommand::VerifyContact { .. } => "verify_contact",
            EngineCommand::SendMessage { .. } => "send_message",
            EngineCommand::SendVoiceMessage { .. } => "send_voice_message",
            EngineCommand::PollMailbox => "poll_mailbox",
            EngineCommand::GetMessages { .. } => "get_messages",
            EngineCommand::GetNetworkStatus => "get_network_status",
            EngineCommand::ConfigureRelay { .. } => "configure_relay",
            EngineCommand::ConfigureMailbox { .. } => "configure_mailbox",
            EngineCommand::Shutdown => "shutdown",
        }
    }

    /// Wire parameter object.
    pub fn params(&self) -> Value {
        match self {
            EngineCommand::GenerateIdentity { passphrase }
            | EngineCommand::LoadIdentity { passphrase } => {
                json!({ "passphrase": passphrase })
            }
            EngineCommand::ExportIdentity => json!({}),
            EngineCommand::ImportIdentity {
                import_data,
                passphrase,
            } => json!({ "import_data": import_data, "passphrase": passphrase }),
            EngineCommand::AddContact {
                label,
                public_key,
                onion_address,
                mailbox_id,
            } => json!({
                "label": label,
                "public_key": public_key,
                "onion_address": onion_address.as_deref().unwrap_or(""),
                "mailbox_id": mailbox_id.as_deref().unwrap_or(""),
            }),
            EngineCommand::RemoveContact { contact_id }
            | EngineCommand::VerifyContact { contact_id }
            | EngineCommand::GetMessages { contact_id } => {
                json!({ "contact_id": contact_id })
            }
            EngineCommand::ListContacts => json!({}),
            EngineCommand::SendMessage { contact_id, text } => {
                json!({ "contact_id": contact_id, "text": text })
            }
            EngineCommand::SendVoiceMessage {
                contact_id,
                file_path,
            } => json!({ "contact_id": contact_id, "file_path": file_path }),
            EngineCommand::PollMailbox => json!({}),
            EngineCommand::GetNetworkStatus => json!({}),
            EngineCommand::ConfigureRelay { preferences } => preferences.clone(),
            EngineCommand::ConfigureMailbox { address } => json!({ "address": address }),
            EngineCommand::Shutdown => json!({}),
        }
    }

    /// Human-readable description for logging.
    pub fn description(&self) -> &'static str {
        match self {
            EngineCommand::GenerateIdentity { .. } => "generate identity",
            EngineCommand::LoadIdentity { .. } => "load identity",
            EngineCommand::ExportIdentity => "export identity",
            EngineCommand::ImportIdentity { .. } => "import identity",
            EngineCommand::AddContact { .. } => "add contact",
            EngineCommand::RemoveContact { .. } => "remove contact",
            EngineCommand::ListContacts => "list contacts",
            EngineCommand::VerifyContact { .. } => "verify contact",
            EngineCommand::SendMessage { .. } => "send message",
            EngineCommand::SendVoiceMessage { .. } => "send voice message",
            EngineCommand::PollMailbox => "poll mailbox",
            EngineCommand::GetMessages { .. } => "get message history",
            EngineCommand::GetNetworkStatus => "get network status",
            EngineCommand::ConfigureRelay { .. } => "configure relay",
            EngineCommand::ConfigureMailbox { .. } => "configure mailbox",
            EngineCommand::Shutdown => "shutdown engine",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Request;

    fn build(cmd: &EngineCommand, id: u64) -> Value {
        let line = Request::new(id, cmd.method(), cmd.params()).to_line();
        serde_json::from_str(&line).unwrap()
    }

    #[test]
    fn test_send_message_frame() {
        let cmd = EngineCommand::SendMessage {
            contact_id: "c1".into(),
            text: "hello".into(),
        };
        let frame = build(&cmd, 9);
        assert_eq!(frame["id"], 9);
        assert_eq!(frame["method"], "send_message");
        assert_eq!(frame["params"]["contact_id"], "c1");
        assert_eq!(frame["params"]["text"], "hello");
    }

    #[test]
    fn test_identity_frames() {
        let cmd = EngineCommand::GenerateIdentity {
            passphrase: "hunter2".into(),
        };
        let frame = build(&cmd, 1);
        assert_eq!(frame["method"], "generate_identity");
        assert_eq!(frame["params"]["passphrase"], "hunter2");

        let cmd = EngineCommand::ImportIdentity {
            import_data: "{\"public_key\":\"aa\"}".into(),
            passphrase: "pw".into(),
        };
        let frame = build(&cmd, 2);
        assert_eq!(frame["method"], "import_identity");
        assert!(frame["params"]["import_data"].as_str().unwrap().contains("public_key"));
    }

    #[test]
    fn test_add_contact_optional_fields_default_empty() {
        let cmd = EngineCommand::AddContact {
            label: "alice".into(),
            public_key: "ab12".into(),
            onion_address: None,
            mailbox_id: Some("m1".into()),
        };
        let frame = build(&cmd, 3);
        assert_eq!(frame["params"]["onion_address"], "");
        assert_eq!(frame["params"]["mailbox_id"], "m1");
    }

    #[test]
    fn test_parameterless_commands() {
        for cmd in [
            EngineCommand::ExportIdentity,
            EngineCommand::ListContacts,
            EngineCommand::PollMailbox,
            EngineCommand::GetNetworkStatus,
            EngineCommand::Shutdown,
        ] {
            let frame = build(&cmd, 4);
            assert!(frame["params"].as_object().unwrap().is_empty());
        }
    }

    #[test]
    fn test_method_names_match_engine_dispatch_table() {
        assert_eq!(EngineCommand::Shutdown.method(), "shutdown");
        assert_eq!(EngineCommand::PollMailbox.method(), "poll_mailbox");
        assert_eq!(
            EngineCommand::VerifyContact {
                contact_id: "x".into()
            }
            .method(),
            "verify_contact"
        );
        assert_eq!(
            EngineCommand::SendVoiceMessage {
                contact_id: "x".into(),
                file_path: "/tmp/v.ogg".into()
            }
            .method(),
            "send_voice_message"
        );
    }
}

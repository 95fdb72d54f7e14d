use chrono::{DateTime, Local};

/// Who authored a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One entry in the assistant conversation.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: u64,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Local>,
}

/// Ordered record of the conversation. Appending is the only mutation;
/// entries keep their id, content, and position for the whole session.
pub struct Transcript {
    messages: Vec<Message>,
    next_id: u64,
    stick_to_bottom: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            next_id: 1,
            stick_to_bottom: true,
        }
    }

    /// Append a message and pin the rendered view to the newest entry.
    pub fn push(&mut self, role: Role, content: impl Into<String>) -> &Message {
        let index = self.messages.len();
        self.messages.push(Message {
            id: self.next_id,
            role,
            content: content.into(),
            timestamp: Local::now(),
        });
        self.next_id += 1;
        self.stick_to_bottom = true;
        &self.messages[index]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Whether the view should follow the newest entry. Set by every push,
    /// released when the user scrolls away from the bottom.
    pub fn stick_to_bottom(&self) -> bool {
        self.stick_to_bottom
    }

    pub fn set_stick_to_bottom(&mut self, stick: bool) {
        self.stick_to_bottom = stick;
    }
}

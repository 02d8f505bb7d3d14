//! Special-use mailboxes of the inbox namespace

use super::Node;

/// Mailbox spam is filed into
pub const SPAM_MAILBOX: &str = "Spam";

/// Whether the store creates or subscribes a mailbox on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoPolicy {
    No,
    Create,
    Subscribe,
}

impl AutoPolicy {
    fn as_str(&self) -> &'static str {
        match self {
            AutoPolicy::No => "no",
            AutoPolicy::Create => "create",
            AutoPolicy::Subscribe => "subscribe",
        }
    }
}

/// A mailbox with an RFC 6154 special-use flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialMailbox {
    pub name: &'static str,
    pub special_use: &'static str,
    pub auto: AutoPolicy,
}

pub const SPECIAL_MAILBOXES: [SpecialMailbox; 5] = [
    SpecialMailbox {
        name: "Sent",
        special_use: "\\Sent",
        auto: AutoPolicy::Subscribe,
    },
    SpecialMailbox {
        name: "Drafts",
        special_use: "\\Drafts",
        auto: AutoPolicy::Subscribe,
    },
    SpecialMailbox {
        name: SPAM_MAILBOX,
        special_use: "\\Junk",
        auto: AutoPolicy::Subscribe,
    },
    SpecialMailbox {
        name: "Trash",
        special_use: "\\Trash",
        auto: AutoPolicy::Subscribe,
    },
    SpecialMailbox {
        name: "Archive",
        special_use: "\\Archive",
        auto: AutoPolicy::Create,
    },
];

impl SpecialMailbox {
    fn node(&self) -> Node {
        Node::section(
            "mailbox",
            Some(self.name),
            vec![
                Node::setting("special_use", self.special_use),
                Node::setting("auto", self.auto.as_str()),
            ],
        )
    }
}

/// `namespace inbox { ... }`
pub fn inbox_namespace() -> Node {
    let mut body = vec![
        Node::setting("inbox", "yes"),
        Node::setting("separator", "/"),
    ];
    body.extend(SPECIAL_MAILBOXES.iter().map(SpecialMailbox::node));
    Node::section("namespace", Some("inbox"), body)
}

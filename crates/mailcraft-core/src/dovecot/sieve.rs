//! Spam sieve run before user scripts

use super::mailboxes::SPAM_MAILBOX;

/// Header the spam filter sets on messages it classifies as spam
pub const SPAM_FLAG_HEADER: &str = "X-Spam";

/// Sieve script filing flagged messages into the spam mailbox
pub fn spam_sieve() -> String {
    format!(
        concat!(
            "require [\"fileinto\"];\n",
            "\n",
            "if header :is \"{header}\" \"yes\" {{\n",
            "  fileinto \"{mailbox}\";\n",
            "  stop;\n",
            "}}\n",
        ),
        header = SPAM_FLAG_HEADER,
        mailbox = SPAM_MAILBOX,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spam_sieve() {
        assert_eq!(
            spam_sieve(),
            "require [\"fileinto\"];\n\nif header :is \"X-Spam\" \"yes\" {\n  fileinto \"Spam\";\n  stop;\n}\n"
        );
    }
}

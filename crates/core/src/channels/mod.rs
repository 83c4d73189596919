//! Concrete delivery channels and their wiring from settings.

pub mod email;
pub mod file;
pub mod line;
pub mod telegram;

pub use email::EmailChannel;
pub use file::FileChannel;
pub use line::LineChannel;
pub use telegram::TelegramChannel;

use crate::config::Settings;
use crate::delivery::{Channel, ChannelKind, ChannelRegistration, ChannelTable};

/// One registration per channel kind whose credentials are present. The file channel needs
/// none and is always registered.
pub fn build_registrations(
    settings: &Settings,
    table: &ChannelTable,
) -> anyhow::Result<Vec<ChannelRegistration>> {
    let mut out = Vec::new();

    for kind in ChannelKind::ALL {
        let channel: Option<Box<dyn Channel>> = match kind {
            ChannelKind::Line => match settings.line_credentials() {
                Some((token, user)) => Some(Box::new(LineChannel::new(token, user)?)),
                None => None,
            },
            ChannelKind::Telegram => match settings.telegram_credentials() {
                Some((token, chat)) => Some(Box::new(TelegramChannel::new(token, chat)?)),
                None => None,
            },
            ChannelKind::Email => match settings.email_config() {
                Some(cfg) => Some(Box::new(EmailChannel::new(&cfg)?)),
                None => None,
            },
            ChannelKind::File => Some(Box::new(FileChannel::new(settings.notifications_dir()))),
        };

        match channel {
            Some(channel) => {
                let reg = ChannelRegistration::from_settings(channel, table.get(kind));
                tracing::debug!(channel = %kind, priority = reg.priority(), "channel configured");
                out.push(reg);
            }
            None => tracing::info!(channel = %kind, "channel credentials missing; not registered"),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_channel_is_always_available() {
        let dir = tempfile::tempdir().unwrap();
        let regs = build_registrations(&Settings::local(dir.path()), &ChannelTable::default()).unwrap();
        let ids: Vec<_> = regs.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["file"]);
        assert_eq!(regs[0].priority(), 4);
    }

    #[test]
    fn credentials_enable_channels() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::local(dir.path());
        settings.telegram_bot_token = Some("123:abc".into());
        settings.telegram_chat_id = Some("42".into());
        settings.line_channel_access_token = Some("token".into());

        let regs = build_registrations(&settings, &ChannelTable::default()).unwrap();
        let ids: Vec<_> = regs.iter().map(|r| r.id()).collect();
        // LINE lacks a user id.
        assert_eq!(ids, vec!["telegram", "file"]);
    }
}

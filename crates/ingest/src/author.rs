//! Author resolution for ingested content.

use canonical::sanitize_text;
use protocol::ContentPayload;

use crate::config::{AuthorMode, ReceiverConfig};
use crate::store::{AuthorDirectory, Role, User, UserId};

/// Pick the owner of an ingested item.
///
/// Each mode falls through to `fixed_author_id` (when non-zero) if it cannot
/// resolve a user. Users matched by name or email must hold a role that may
/// own content.
pub(crate) fn resolve_author(
    directory: &dyn AuthorDirectory,
    payload: &ContentPayload,
    config: &ReceiverConfig,
) -> Option<UserId> {
    let resolved = match config.author_mode {
        AuthorMode::FixedAuthor => None,
        AuthorMode::RandomEditor => random_editor(directory),
        AuthorMode::ByName => payload
            .author
            .as_ref()
            .map(|a| sanitize_text(&a.name))
            .filter(|name| !name.is_empty())
            .and_then(|name| {
                directory
                    .by_login(&name)
                    .or_else(|| directory.by_display_name(&name))
            })
            .filter(may_own)
            .map(|u| u.id),
        AuthorMode::ByEmail => payload
            .author
            .as_ref()
            .map(|a| a.email.trim().to_string())
            .filter(|email| !email.is_empty())
            .and_then(|email| directory.by_email(&email))
            .filter(may_own)
            .map(|u| u.id),
    };
    resolved.or_else(|| Some(config.fixed_author_id).filter(|id| *id > 0))
}

fn random_editor(directory: &dyn AuthorDirectory) -> Option<UserId> {
    let editors = directory.with_role(Role::Editor);
    if !editors.is_empty() {
        return Some(editors[fastrand::usize(..editors.len())]);
    }
    directory.with_role(Role::Administrator).first().copied()
}

fn may_own(user: &User) -> bool {
    user.roles.iter().any(Role::may_own_content)
}

//! Who may see a ticket.

use crate::db::{
    user::{Role, User},
    Ticket,
};

/// Admins see everything, clients only what they created, agents only what
/// their departments own. Callers turn a `false` into `Forbidden`, never
/// into an empty result.
pub fn can_view(ticket: &Ticket, user: &User) -> bool {
    match user.role {
        Role::Admin => true,
        Role::Client => ticket.created_by == user.id,
        Role::Agent => user.is_member_of(ticket.department),
    }
}

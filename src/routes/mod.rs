/// Router Module Index
///
/// Routes are grouped by the gate that protects them. `create_router` wraps
/// each group in its middleware before merging.

/// Open to anonymous callers: sign-up, login and read-only catalogue access.
pub mod public;

/// `/users/{id}`: the caller must be that user or an admin.
pub mod authenticated;

/// Admin-only: user listing and every restaurant/menu mutation.
pub mod admin;

//! Permission checking for roomwarden.
//!
//! Commands declare an [`AccessLevel`]; [`check_access`] compares it with what
//! is known about the sender.

use thiserror::Error;

/// Permission-related errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PermissionError {
    /// Sender is neither a room admin nor a super-admin.
    #[error("this command requires room admin rights")]
    NotRoomAdmin,

    /// Sender is a room admin but not a super-admin.
    #[error("this command requires super-admin rights")]
    NotSuperAdmin,
}

/// Rights needed to run a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessLevel {
    /// Anyone in the room.
    Anyone,
    /// Room admins and super-admins.
    RoomAdmin,
    /// Room admins that are also super-admins.
    SuperAdmin,
}

/// Check a sender against the required level.
///
/// `is_admin` already includes super-admins. `SuperAdmin` is two-tier: the
/// sender must pass the room admin check first and be in the global set too.
///
/// # Examples
///
/// ```
/// use roomwarden::auth::{check_access, AccessLevel, PermissionError};
///
/// assert!(check_access(AccessLevel::Anyone, false, false).is_ok());
/// assert_eq!(
///     check_access(AccessLevel::SuperAdmin, true, false),
///     Err(PermissionError::NotSuperAdmin)
/// );
/// ```
pub fn check_access(
    required: AccessLevel,
    is_admin: bool,
    is_super_admin: bool,
) -> Result<(), PermissionError> {
    match required {
        AccessLevel::Anyone => Ok(()),
        AccessLevel::RoomAdmin => {
            if is_admin {
                Ok(())
            } else {
                Err(PermissionError::NotRoomAdmin)
            }
        }
        AccessLevel::SuperAdmin => {
            if !is_admin {
                return Err(PermissionError::NotRoomAdmin);
            }
            if !is_super_admin {
                return Err(PermissionError::NotSuperAdmin);
            }
            Ok(())
        }
    }
}

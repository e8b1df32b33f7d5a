use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Platform-wide role attached to a user account. TEACHER and HOD form the
/// staff tier allowed to create announcement groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Teacher,
    Hod,
    Student,
}

impl UserRole {
    pub fn is_staff(self) -> bool {
        matches!(self, UserRole::Teacher | UserRole::Hod)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UserRole::Teacher => "TEACHER",
            UserRole::Hod => "HOD",
            UserRole::Student => "STUDENT",
        };
        f.write_str(s)
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEACHER" => Ok(UserRole::Teacher),
            "HOD" => Ok(UserRole::Hod),
            "STUDENT" => Ok(UserRole::Student),
            other => Err(format!("unknown user role: {other}")),
        }
    }
}

/// Role inside a single announcement group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupRole {
    Admin,
    Member,
}

impl fmt::Display for GroupRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GroupRole::Admin => "ADMIN",
            GroupRole::Member => "MEMBER",
        };
        f.write_str(s)
    }
}

impl FromStr for GroupRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(GroupRole::Admin),
            "MEMBER" => Ok(GroupRole::Member),
            other => Err(format!("unknown group role: {other}")),
        }
    }
}

/// What an announcement carries: plain text, a file attachment, or a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnnouncementKind {
    Text,
    File,
    Poll,
}

impl fmt::Display for AnnouncementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnnouncementKind::Text => "TEXT",
            AnnouncementKind::File => "FILE",
            AnnouncementKind::Poll => "POLL",
        };
        f.write_str(s)
    }
}

impl FromStr for AnnouncementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEXT" => Ok(AnnouncementKind::Text),
            "FILE" => Ok(AnnouncementKind::File),
            "POLL" => Ok(AnnouncementKind::Poll),
            other => Err(format!("unknown announcement kind: {other}")),
        }
    }
}

/// Tags every new group starts with.
pub const DEFAULT_TAGS: [&str; 4] = ["Notice", "Time Table", "Placement", "Internship"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_round_trip_through_strings() {
        for role in [UserRole::Teacher, UserRole::Hod, UserRole::Student] {
            assert_eq!(role.to_string().parse::<UserRole>().unwrap(), role);
        }
        for role in [GroupRole::Admin, GroupRole::Member] {
            assert_eq!(role.to_string().parse::<GroupRole>().unwrap(), role);
        }
    }

    #[test]
    fn staff_tier() {
        assert!(UserRole::Teacher.is_staff());
        assert!(UserRole::Hod.is_staff());
        assert!(!UserRole::Student.is_staff());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!("VIDEO".parse::<AnnouncementKind>().is_err());
    }
}

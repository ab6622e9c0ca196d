use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Lecturer,
    Student,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "lecturer" => Some(Role::Lecturer),
            "student" => Some(Role::Student),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Lecturer => "lecturer",
            Role::Student => "student",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActorError {
    #[error("missing actor")]
    Missing,
    #[error("actor.role must be one of: admin, lecturer, student (got {0:?})")]
    UnknownRole(String),
    #[error("{0} actor requires profileId")]
    MissingProfile(&'static str),
}

/// Which rows a caller may see. Lecturers are scoped to the course offerings
/// they teach, students to their own rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordScope {
    All,
    Lecturer(String),
    Student(String),
}

/// The already-authenticated caller, supplied with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    pub role: Role,
    pub profile_id: Option<String>,
}

impl ActorContext {
    pub fn new(role: Role, profile_id: Option<String>) -> Result<Self, ActorError> {
        let profile_id = profile_id
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        if role != Role::Admin && profile_id.is_none() {
            return Err(ActorError::MissingProfile(role.as_str()));
        }
        Ok(Self { role, profile_id })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn lecturer_id(&self) -> Option<&str> {
        match self.role {
            Role::Lecturer => self.profile_id.as_deref(),
            _ => None,
        }
    }

    pub fn student_id(&self) -> Option<&str> {
        match self.role {
            Role::Student => self.profile_id.as_deref(),
            _ => None,
        }
    }

    pub fn scope(&self) -> RecordScope {
        match (self.role, self.profile_id.as_ref()) {
            (Role::Lecturer, Some(id)) => RecordScope::Lecturer(id.clone()),
            (Role::Student, Some(id)) => RecordScope::Student(id.clone()),
            _ => RecordScope::All,
        }
    }
}

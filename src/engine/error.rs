/// Entity kind carried by `NotFound`, so callers can tell which lookup missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Item,
    Booking,
    Request,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::User => write!(f, "user"),
            Entity::Item => write!(f, "item"),
            Entity::Booking => write!(f, "booking"),
            Entity::Request => write!(f, "request"),
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    NotFound(Entity, u64),
    /// Caller lacks the required relationship to the entity.
    Forbidden(&'static str),
    /// Input violates a business rule.
    Validation(&'static str),
    /// State already claimed by another row, e.g. a taken email.
    Conflict(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(entity, id) => write!(f, "{entity} not found: {id}"),
            EngineError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            EngineError::Validation(msg) => write!(f, "validation failed: {msg}"),
            EngineError::Conflict(msg) => write!(f, "conflict: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

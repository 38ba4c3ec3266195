use std::fmt::{Display, Formatter};

use leasegate_core::{AppError, AppResult, NonEmptyString};

const LOCK_SUFFIX: &str = "-lock";
const FLAG_SUFFIX: &str = "-flag";

/// Namespace grouping related locks, mapped to a store container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope(NonEmptyString);

impl Scope {
    /// Creates a validated scope name.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = NonEmptyString::new(value)
            .map_err(|_| AppError::Validation("scope must not be empty".to_owned()))?;
        reject_separator("scope", value.as_str())?;
        Ok(Self(value))
    }

    /// Returns the scope name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for Scope {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Name of one object inside a scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(NonEmptyString);

impl ObjectKey {
    /// Creates a validated object key.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = NonEmptyString::new(value)
            .map_err(|_| AppError::Validation("key must not be empty".to_owned()))?;
        reject_separator("key", value.as_str())?;
        Ok(Self(value))
    }

    /// Returns the key name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for ObjectKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Fully qualified `{scope}/{key}` location of one store object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectPath {
    scope: Scope,
    key: ObjectKey,
}

impl ObjectPath {
    /// Creates an object path.
    #[must_use]
    pub fn new(scope: Scope, key: ObjectKey) -> Self {
        Self { scope, key }
    }

    /// Returns the containing scope.
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Returns the object key.
    #[must_use]
    pub fn key(&self) -> &ObjectKey {
        &self.key
    }
}

impl Display for ObjectPath {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}/{}", self.scope, self.key)
    }
}

/// The lock and flag objects backing one gated unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateResources {
    lock: ObjectPath,
    flag: ObjectPath,
}

impl GateResources {
    /// Derives `{id}-lock` and `{id}-flag` paths for one unit id.
    pub fn new(scope: Scope, id: &str) -> AppResult<Self> {
        if id.trim().is_empty() {
            return Err(AppError::Validation("id must not be empty".to_owned()));
        }

        let lock = ObjectPath::new(scope.clone(), ObjectKey::new(format!("{id}{LOCK_SUFFIX}"))?);
        let flag = ObjectPath::new(scope, ObjectKey::new(format!("{id}{FLAG_SUFFIX}"))?);
        Ok(Self { lock, flag })
    }

    /// Returns the lock object path.
    #[must_use]
    pub fn lock(&self) -> &ObjectPath {
        &self.lock
    }

    /// Returns the flag object path.
    #[must_use]
    pub fn flag(&self) -> &ObjectPath {
        &self.flag
    }
}

fn reject_separator(field: &str, value: &str) -> AppResult<()> {
    if value.contains('/') {
        return Err(AppError::Validation(format!(
            "{field} '{value}' must not contain '/'"
        )));
    }

    Ok(())
}

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Domain-rule violations raised to the caller instead of being shown inline.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("{0}ルームは削除できません")]
    UndeletableRoom(String),
    #[error("ログインしていません")]
    NotSignedIn,
}

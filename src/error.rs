use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::result;


/// A result type using our [`Error`] by default.
pub type Result<T, E = Error> = result::Result<T, E>;


/// The kind of an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The symbol data is corrupt beyond what the tolerant parser is
    /// willing to accept.
    InvalidData,
    /// A provided input, such as a rule string, was malformed.
    InvalidInput,
    /// The operation is not supported.
    Unsupported,
}

impl ErrorKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidData => "invalid data",
            Self::InvalidInput => "invalid input",
            Self::Unsupported => "unsupported",
        }
    }
}


#[derive(Debug)]
enum ErrorImpl {
    Leaf {
        kind: ErrorKind,
        message: Cow<'static, str>,
    },
    Context {
        context: Cow<'static, str>,
        source: Box<ErrorImpl>,
    },
}

impl ErrorImpl {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Leaf { kind, .. } => *kind,
            Self::Context { source, .. } => source.kind(),
        }
    }
}

impl Display for ErrorImpl {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Leaf { kind, message } => {
                if message.is_empty() {
                    Display::fmt(kind.as_str(), f)
                } else {
                    write!(f, "{message}")
                }
            }
            Self::Context { context, source } => {
                write!(f, "{context}: {source}")
            }
        }
    }
}


/// The error type used throughout the crate.
///
/// Errors carry an [`ErrorKind`] and a human readable message, with
/// optional layers of context added via [`ErrorExt`].
pub struct Error {
    /// Boxed to keep the on-stack size to a single pointer.
    error: Box<ErrorImpl>,
}

impl Error {
    fn with_kind<M>(kind: ErrorKind, message: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        Self {
            error: Box::new(ErrorImpl::Leaf {
                kind,
                message: message.into(),
            }),
        }
    }

    /// Create an [`Error`] of kind [`ErrorKind::InvalidData`].
    pub fn with_invalid_data<M>(message: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        Self::with_kind(ErrorKind::InvalidData, message)
    }

    /// Create an [`Error`] of kind [`ErrorKind::InvalidInput`].
    pub fn with_invalid_input<M>(message: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        Self::with_kind(ErrorKind::InvalidInput, message)
    }

    /// Create an [`Error`] of kind [`ErrorKind::Unsupported`].
    pub fn with_unsupported<M>(message: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        Self::with_kind(ErrorKind::Unsupported, message)
    }

    /// Retrieve the error's kind.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Error({}: {})", self.kind().as_str(), self.error)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(&self.error, f)
    }
}

impl StdError for Error {}


/// A trait for adding context to an error as it bubbles up.
pub trait ErrorExt: private::Sealed {
    /// The output type produced by [`context`](Self::context) and
    /// [`with_context`](Self::with_context).
    type Output;

    /// Add context to this error.
    fn context<C>(self, context: C) -> Self::Output
    where
        C: Into<Cow<'static, str>>;

    /// Add context to this error, constructed lazily.
    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: Into<Cow<'static, str>>,
        F: FnOnce() -> C;
}

impl ErrorExt for Error {
    type Output = Error;

    fn context<C>(self, context: C) -> Self::Output
    where
        C: Into<Cow<'static, str>>,
    {
        Self {
            error: Box::new(ErrorImpl::Context {
                context: context.into(),
                source: self.error,
            }),
        }
    }

    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: Into<Cow<'static, str>>,
        F: FnOnce() -> C,
    {
        self.context(f())
    }
}

impl<T> ErrorExt for Result<T> {
    type Output = Result<T>;

    fn context<C>(self, context: C) -> Self::Output
    where
        C: Into<Cow<'static, str>>,
    {
        self.map_err(|err| err.context(context))
    }

    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: Into<Cow<'static, str>>,
        F: FnOnce() -> C,
    {
        self.map_err(|err| err.with_context(f))
    }
}

mod private {
    pub trait Sealed {}

    impl Sealed for super::Error {}
    impl<T> Sealed for super::Result<T> {}
}

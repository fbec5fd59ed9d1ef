use std::borrow::Cow;
use std::error;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;


/// A result type using our [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;


/// An enum providing a rough classification of errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The provided data is invalid; e.g., malformed symbol or rule
    /// text.
    InvalidData,
    /// A parameter was incorrect.
    InvalidInput,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let s = match self {
            Self::InvalidData => "invalid data",
            Self::InvalidInput => "invalid input",
        };
        f.write_str(s)
    }
}


enum ErrorImpl {
    InvalidData(Cow<'static, str>),
    InvalidInput(Cow<'static, str>),
    // Strings have different sizes for owned and static variants, so we
    // keep them as separate enum variants instead of a single `Cow` to
    // not blow up the in-memory size of the whole enum.
    ContextOwned {
        context: String,
        source: Box<ErrorImpl>,
    },
    ContextStatic {
        context: &'static str,
        source: Box<ErrorImpl>,
    },
}

impl ErrorImpl {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidData(..) => ErrorKind::InvalidData,
            Self::InvalidInput(..) => ErrorKind::InvalidInput,
            Self::ContextOwned { source, .. } | Self::ContextStatic { source, .. } => source.kind(),
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::InvalidData(msg) | Self::InvalidInput(msg) => msg,
            Self::ContextOwned { context, .. } => context,
            Self::ContextStatic { context, .. } => context,
        }
    }
}

impl Debug for ErrorImpl {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut dbg = f.debug_struct(stringify!(Error));
        let mut err = self;
        let mut idx = 0usize;
        loop {
            let _ref = dbg.field(&format!("layer{idx}"), &err.message());
            match err {
                Self::ContextOwned { source, .. } | Self::ContextStatic { source, .. } => {
                    err = source;
                    idx += 1;
                }
                _ => break,
            }
        }
        dbg.finish()
    }
}

impl Display for ErrorImpl {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.message())
    }
}

impl error::Error for ErrorImpl {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::ContextOwned { source, .. } | Self::ContextStatic { source, .. } => Some(source),
            _ => None,
        }
    }
}


/// The error type used by the library.
///
/// Errors generally form a layered "onion": the outermost layer carries
/// the most user-friendly context and inner layers describe the root
/// cause, accessible via the standard [`Error::source`][std-source]
/// chain.
///
/// [std-source]: std::error::Error::source
// Representation is optimized for fast copying (a single machine word),
// not necessarily fast creation, as we expect errors to be rare.
pub struct Error {
    error: Box<ErrorImpl>,
}

impl Error {
    /// Create an [`Error`] of kind [`ErrorKind::InvalidData`].
    pub fn with_invalid_data(message: impl IntoCowStr) -> Self {
        Self {
            error: Box::new(ErrorImpl::InvalidData(message.into_cow_str())),
        }
    }

    /// Create an [`Error`] of kind [`ErrorKind::InvalidInput`].
    pub fn with_invalid_input(message: impl IntoCowStr) -> Self {
        Self {
            error: Box::new(ErrorImpl::InvalidInput(message.into_cow_str())),
        }
    }

    /// Retrieve a rough error classification in the form of an
    /// [`ErrorKind`].
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    fn layer_context(self, context: Cow<'static, str>) -> Self {
        let error = match context {
            Cow::Owned(context) => ErrorImpl::ContextOwned {
                context,
                source: self.error,
            },
            Cow::Borrowed(context) => ErrorImpl::ContextStatic {
                context,
                source: self.error,
            },
        };
        Self {
            error: Box::new(error),
        }
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Debug::fmt(&self.error, f)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let err = &self.error;
        write!(f, "{err}")?;

        let mut source_opt = error::Error::source(&**err);
        while let Some(source) = source_opt {
            write!(f, ": {source}")?;
            source_opt = error::Error::source(source);
        }
        Ok(())
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        error::Error::source(&*self.error)
    }
}


/// A helper trait for types convertible into a `Cow<'static, str>`,
/// avoiding the allocation that a plain `Into<Cow<..>>` bound would
/// force on `&'static str` arguments.
pub trait IntoCowStr {
    /// Perform the conversion.
    fn into_cow_str(self) -> Cow<'static, str>;
}

impl IntoCowStr for &'static str {
    fn into_cow_str(self) -> Cow<'static, str> {
        Cow::Borrowed(self)
    }
}

impl IntoCowStr for String {
    fn into_cow_str(self) -> Cow<'static, str> {
        Cow::Owned(self)
    }
}


/// A trait providing ergonomic chaining capabilities to [`Error`] and
/// `Result`s containing it.
pub trait ErrorExt: private::Sealed {
    /// The type returned from the context methods.
    type Output;

    /// Add context to this error.
    fn context<C>(self, context: C) -> Self::Output
    where
        C: IntoCowStr;

    /// Add context to this error, lazily evaluated.
    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: IntoCowStr,
        F: FnOnce() -> C;
}

impl ErrorExt for Error {
    type Output = Error;

    fn context<C>(self, context: C) -> Self::Output
    where
        C: IntoCowStr,
    {
        self.layer_context(context.into_cow_str())
    }

    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: IntoCowStr,
        F: FnOnce() -> C,
    {
        self.layer_context(f().into_cow_str())
    }
}

impl<T, E> ErrorExt for Result<T, E>
where
    E: ErrorExt<Output = Error>,
{
    type Output = Result<T, Error>;

    fn context<C>(self, context: C) -> Self::Output
    where
        C: IntoCowStr,
    {
        self.map_err(|err| err.context(context))
    }

    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: IntoCowStr,
        F: FnOnce() -> C,
    {
        self.map_err(|err| err.with_context(f))
    }
}


mod private {
    use super::Error;

    pub trait Sealed {}

    impl Sealed for Error {}
    impl<T, E> Sealed for Result<T, E> where E: Sealed {}
}


#[cfg(test)]
mod tests {
    use super::*;


    /// Check that we can format errors and their context as expected.
    #[test]
    fn error_display() {
        let err = Error::with_invalid_data("some invalid data");
        assert_eq!(err.to_string(), "some invalid data");
        assert_eq!(err.kind(), ErrorKind::InvalidData);

        let err = err.context("a higher level operation failed");
        assert_eq!(
            err.to_string(),
            "a higher level operation failed: some invalid data"
        );
        // Context does not change the error's kind.
        assert_eq!(err.kind(), ErrorKind::InvalidData);

        let err = err.with_context(|| format!("module {} could not be loaded", "libc.so"));
        assert_eq!(
            err.to_string(),
            "module libc.so could not be loaded: a higher level operation failed: some invalid data"
        );
    }

    /// Make sure that the `Debug` representation includes all layers.
    #[test]
    fn error_debug() {
        let err = Error::with_invalid_input("input is broken");
        let err = err.context("loading failed");
        let dbg = format!("{err:?}");
        assert!(dbg.contains("loading failed"), "{dbg}");
        assert!(dbg.contains("input is broken"), "{dbg}");
    }
}

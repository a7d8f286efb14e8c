use std::fmt;
use std::io;

use crate::automaton;
use crate::frontend;

/// Top level error type returned by the generator pipeline.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Frontend(frontend::Error),
    Automaton(automaton::Error),
    TooManyErrors(usize),
    UnexpectedConflicts {
        shift_reduce: usize,
        reduce_reduce: usize,
    },
    Emit(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Frontend(err) => write!(f, "{}", err),
            Error::Automaton(err) => write!(f, "{}", err),
            Error::TooManyErrors(n) => write!(f, "{} error(s) found: aborting", n),
            Error::UnexpectedConflicts {
                shift_reduce,
                reduce_reduce,
            } => write!(
                f,
                "unexpected conflicts: {} shift/reduce, {} reduce/reduce",
                shift_reduce, reduce_reduce
            ),
            Error::Emit(msg) => write!(f, "code generation error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<frontend::Error> for Error {
    fn from(err: frontend::Error) -> Self {
        Error::Frontend(err)
    }
}

impl From<automaton::Error> for Error {
    fn from(err: automaton::Error) -> Self {
        Error::Automaton(err)
    }
}

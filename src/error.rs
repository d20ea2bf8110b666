use std::io;

#[derive(Debug)]
pub enum Error {
    IO(io::Error),
    Usage(String),
    Parse(String),
    /// A name with no binding, or a register/memory cell read before written.
    Lookup(String),
    Type(String),
    /// A jump to an address that is not an instruction index.
    Control(String),
    /// Memory exhausted or addressed outside its bounds.
    Resource(String),
    Config(String),
    Runtime(String),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::IO(_) => 1,
            Error::Usage(_) => 2,
            Error::Parse(_) => 3,
            Error::Lookup(_) => 4,
            Error::Type(_) => 5,
            Error::Control(_) => 6,
            Error::Resource(_) => 7,
            Error::Config(_) => 8,
            Error::Runtime(_) => 9,
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::IO(error)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::IO(e) => e.fmt(f),
            Error::Usage(s) => f.write_str(s),
            Error::Parse(s) => write!(f, "Parse error: {}", s),
            Error::Lookup(s) => write!(f, "Def error: {}", s),
            Error::Type(s) => write!(f, "Type error: {}", s),
            Error::Control(s) => write!(f, "Control error: {}", s),
            Error::Resource(s) => write!(f, "Resource error: {}", s),
            Error::Config(s) => write!(f, "Configuration error: {}", s),
            Error::Runtime(s) => write!(f, "Runtime error: {}", s),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IO(e) => Some(e),
            _ => None,
        }
    }
}

mod diagnostics;
mod discovery;
mod mapping;

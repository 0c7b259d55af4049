//! Compiler resolution for the sandbox. The farm harvests intermediate
//! representation, so clang is preferred; gcc keeps plain builds going when
//! the sandbox image lacks it.

/// The C compiler executable for the sandbox, first match wins.
pub fn c_compiler() -> Option<&'static str> {
    ["clang", "gcc", "cc"]
        .into_iter()
        .find(|name| which::which(name).is_ok())
}

/// The C++ compiler executable for the sandbox.
pub fn cxx_compiler() -> Option<&'static str> {
    ["clang++", "g++", "c++"]
        .into_iter()
        .find(|name| which::which(name).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_does_not_panic() {
        // What resolves depends on the sandbox image; only the contract that
        // a resolved name is one of the known executables is stable.
        if let Some(cc) = c_compiler() {
            assert!(["clang", "gcc", "cc"].contains(&cc));
        }
        if let Some(cxx) = cxx_compiler() {
            assert!(["clang++", "g++", "c++"].contains(&cxx));
        }
    }
}

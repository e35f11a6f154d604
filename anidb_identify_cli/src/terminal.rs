//! Terminal detection

use is_terminal::IsTerminal;
use std::env;
use std::io::{stderr, stdout};

/// Environment variables set by common CI runners
const CI_VARS: &[&str] = &[
    "CI",
    "CONTINUOUS_INTEGRATION",
    "JENKINS_URL",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "TRAVIS",
    "CIRCLECI",
    "BUILDKITE",
    "TF_BUILD",
];

/// Whether stdout is a terminal a person is looking at
pub fn is_interactive() -> bool {
    stdout().is_terminal() && !is_ci_environment()
}

fn is_ci_environment() -> bool {
    CI_VARS.iter().any(|var| env::var_os(var).is_some())
}

fn supports_ansi() -> bool {
    let term = env::var("TERM").unwrap_or_default();
    cfg!(windows) || !(term.is_empty() || term == "dumb")
}

/// Progress bars go to stderr, so that is the stream that must be a terminal
pub fn should_show_progress() -> bool {
    stderr().is_terminal() && !is_ci_environment() && supports_ansi()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_detection_does_not_panic() {
        let _ = is_interactive();
        let _ = should_show_progress();
    }

    #[test]
    fn test_ci_vars_are_unique() {
        let mut vars = CI_VARS.to_vec();
        vars.sort_unstable();
        vars.dedup();
        assert_eq!(vars.len(), CI_VARS.len());
    }

    #[test]
    #[serial]
    fn test_ci_hides_progress() {
        let previous = env::var_os("CI");
        // SAFETY: serial tests are the only ones touching the environment
        unsafe { env::set_var("CI", "true") };
        assert!(!should_show_progress());
        assert!(!is_interactive());
        match previous {
            Some(value) => unsafe { env::set_var("CI", value) },
            None => unsafe { env::remove_var("CI") },
        }
    }
}

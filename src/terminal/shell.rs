//! One-line prompt overrides that make each shell report its working
//! directory with an OSC 7 sequence every time it draws a prompt.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShellFamily {
    Zsh,
    Bash,
    Fish,
    PowerShell,
    Other,
}

impl ShellFamily {
    pub fn detect(program: &str) -> Self {
        let name = display_name(program).to_ascii_lowercase();
        match name.trim_end_matches(".exe") {
            "zsh" => ShellFamily::Zsh,
            "bash" | "sh" => ShellFamily::Bash,
            "fish" => ShellFamily::Fish,
            "pwsh" | "powershell" => ShellFamily::PowerShell,
            _ => ShellFamily::Other,
        }
    }

    /// Text to type into a freshly spawned shell, ending in a carriage return.
    /// The leading space keeps it out of history where the shell supports that.
    pub fn prompt_hook(self) -> Option<&'static str> {
        match self {
            ShellFamily::Zsh => Some(concat!(
                r#" precmd_functions+=(_hive_osc7); _hive_osc7() { printf '\033]7;file://%s%s\007' "$HOST" "$PWD"; }"#,
                "\r"
            )),
            ShellFamily::Bash => Some(concat!(
                r#" PROMPT_COMMAND='printf "\033]7;file://%s%s\007" "$HOSTNAME" "$PWD"'"${PROMPT_COMMAND:+;$PROMPT_COMMAND}""#,
                "\r"
            )),
            ShellFamily::Fish => Some(concat!(
                r#" function __hive_osc7 --on-event fish_prompt; printf '\e]7;file://%s%s\a' (hostname) $PWD; end"#,
                "\r"
            )),
            ShellFamily::PowerShell => Some(concat!(
                r#"function prompt { $p = (Get-Location).Path; "$([char]27)]7;$p$([char]7)PS $p> " }"#,
                "\r"
            )),
            ShellFamily::Other => None,
        }
    }
}

/// Basename of the shell program, used for default pane names.
pub fn display_name(program: &str) -> &str {
    program
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(program)
}

/// `$SHELL`, falling back to `/bin/sh`.
pub fn default_program() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect() {
        assert_eq!(ShellFamily::detect("/bin/zsh"), ShellFamily::Zsh);
        assert_eq!(ShellFamily::detect("/usr/local/bin/bash"), ShellFamily::Bash);
        assert_eq!(ShellFamily::detect("fish"), ShellFamily::Fish);
        assert_eq!(ShellFamily::detect("C:\\Windows\\powershell.exe"), ShellFamily::PowerShell);
        assert_eq!(ShellFamily::detect("/usr/bin/nu"), ShellFamily::Other);
    }

    #[test]
    fn test_hooks_emit_osc7_and_submit() {
        for family in [ShellFamily::Zsh, ShellFamily::Bash, ShellFamily::Fish, ShellFamily::PowerShell] {
            let hook = family.prompt_hook().unwrap();
            assert!(hook.contains("]7;"), "{family:?}");
            assert!(hook.ends_with('\r'));
            assert_eq!(hook.matches('\r').count(), 1);
        }
        assert_eq!(ShellFamily::Other.prompt_hook(), None);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("/bin/zsh"), "zsh");
        assert_eq!(display_name("pwsh"), "pwsh");
        assert_eq!(display_name("C:\\tools\\pwsh.exe"), "pwsh.exe");
    }
}

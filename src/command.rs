use shell_escape::unix::escape;

/// A diagnostic command to be run over the session's exec channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub(crate) program: String,
    pub(crate) args: Vec<String>,
}

impl RemoteCommand {
    pub fn new(program: impl Into<String>) -> RemoteCommand {
        RemoteCommand {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(&mut self, argument: impl Into<String>) -> &mut Self {
        self.args.push(argument.into());
        self
    }

    pub fn args<I, S>(&mut self, arguments: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(arguments.into_iter().map(Into::into));
        self
    }

    /// Renders the program followed by its shell-escaped arguments.
    ///
    /// The program itself is left untouched so that shell expansions such as
    /// `echo $LANG` keep working.
    pub fn render(&self) -> String {
        let mut output = self.program.clone();
        for arg in &self.args {
            output.push(' ');
            output.push_str(&escape(arg.as_str().into()));
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_escapes_arguments() {
        assert_eq!(RemoteCommand::new("uname -s").render(), "uname -s");
        assert_eq!(
            RemoteCommand::new("getent").args(["passwd", "1000"]).render(),
            "getent passwd 1000"
        );
        assert_eq!(
            RemoteCommand::new("getent").arg("group").arg("a b; rm -rf /").render(),
            "getent group 'a b; rm -rf /'"
        );
    }
}

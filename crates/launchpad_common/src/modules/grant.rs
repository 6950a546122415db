//! Grant statements
//!
//! `--add-exports=MODULE/PACKAGE=T1,T2`, `--add-opens=MODULE/PACKAGE=T1`,
//! `--add-reads=MODULE=T1,T2`. Parsed up front so a typo fails the launch
//! before anything is loaded.

use std::fmt;
use std::str::FromStr;

use crate::error::LauncherError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrantOp {
    AddExports,
    AddOpens,
    AddReads,
}

impl GrantOp {
    pub fn flag(self) -> &'static str {
        match self {
            GrantOp::AddExports => "--add-exports",
            GrantOp::AddOpens => "--add-opens",
            GrantOp::AddReads => "--add-reads",
        }
    }

    fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "--add-exports" => Some(GrantOp::AddExports),
            "--add-opens" => Some(GrantOp::AddOpens),
            "--add-reads" => Some(GrantOp::AddReads),
            _ => None,
        }
    }
}

/// One parsed grant. `package` is `None` only for `--add-reads`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub op: GrantOp,
    pub source: String,
    pub package: Option<String>,
    pub targets: Vec<String>,
}

impl Grant {
    pub fn parse(statement: &str) -> Result<Self, LauncherError> {
        let malformed = |reason: &str| LauncherError::MalformedGrant {
            statement: statement.to_string(),
            reason: reason.to_string(),
        };

        let fields: Vec<&str> = statement.trim().split('=').collect();
        if fields.len() != 3 {
            return Err(malformed("expected OPERATION=SOURCE=TARGETS"));
        }

        let op = GrantOp::from_flag(fields[0]).ok_or_else(|| malformed("unknown operation"))?;

        let (source, package) = match op {
            GrantOp::AddReads => {
                if fields[1].contains('/') {
                    return Err(malformed("--add-reads takes a module, not a package"));
                }
                (fields[1], None)
            }
            GrantOp::AddExports | GrantOp::AddOpens => {
                let (module, package) = fields[1]
                    .split_once('/')
                    .ok_or_else(|| malformed("missing /PACKAGE"))?;
                if package.is_empty() {
                    return Err(malformed("empty package"));
                }
                (module, Some(package.to_string()))
            }
        };
        if source.is_empty() {
            return Err(malformed("empty source module"));
        }

        let targets: Vec<String> = fields[2].split(',').map(|t| t.trim().to_string()).collect();
        if targets.iter().any(String::is_empty) {
            return Err(malformed("empty target module"));
        }

        Ok(Self {
            op,
            source: source.to_string(),
            package,
            targets,
        })
    }

    /// Parse a whole option list, failing on the first bad statement
    pub fn parse_all(statements: &[String]) -> Result<Vec<Self>, LauncherError> {
        statements.iter().map(|s| Self::parse(s)).collect()
    }
}

impl FromStr for Grant {
    type Err = LauncherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.op.flag(), self.source)?;
        if let Some(package) = &self.package {
            write!(f, "/{}", package)?;
        }
        write!(f, "={}", self.targets.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exports() {
        let grant = Grant::parse("--add-exports=app.core/com.x=app.plugin,app.ui").unwrap();
        assert_eq!(grant.op, GrantOp::AddExports);
        assert_eq!(grant.source, "app.core");
        assert_eq!(grant.package.as_deref(), Some("com.x"));
        assert_eq!(grant.targets, vec!["app.plugin", "app.ui"]);
        assert_eq!(
            grant.to_string(),
            "--add-exports=app.core/com.x=app.plugin,app.ui"
        );
    }

    #[test]
    fn test_parse_reads() {
        let grant: Grant = "--add-reads=app.plugin=app.core".parse().unwrap();
        assert_eq!(grant.op, GrantOp::AddReads);
        assert_eq!(grant.package, None);
        assert_eq!(grant.targets, vec!["app.core"]);
    }

    #[test]
    fn test_package_split_once() {
        let grant = Grant::parse("--add-opens=app.core/com/x=app.ui").unwrap();
        assert_eq!(grant.package.as_deref(), Some("com/x"));
    }

    #[test]
    fn test_malformed_statements() {
        for statement in [
            "--add-exports=app.core/com.x",
            "--add-exports=app.core/com.x=a=b",
            "--add-exports=app.core=app.plugin",
            "--add-opens=app.core/=app.plugin",
            "--add-exports=/com.x=app.plugin",
            "--add-reads==app.core",
            "--add-reads=app.core/com.x=app.ui",
            "--add-exports=app.core/com.x=app.plugin,",
            "--patch-module=app.core/com.x=app.plugin",
            "",
        ] {
            let err = Grant::parse(statement).unwrap_err();
            assert!(
                matches!(err, LauncherError::MalformedGrant { .. }),
                "{} should be malformed",
                statement
            );
        }
    }

    #[test]
    fn test_parse_all_stops_at_first_error() {
        let statements = vec![
            "--add-reads=a=b".to_string(),
            "bogus".to_string(),
        ];
        let err = Grant::parse_all(&statements).unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }
}

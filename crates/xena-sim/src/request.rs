//! Parsing of command lines received by the virtual chassis

/// Port part of a command address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSelector {
    One(u32),
    /// `m/*`: every port of the module
    All,
}

/// One parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request<'a> {
    pub module: Option<u32>,
    pub port: Option<PortSelector>,
    /// Upper-cased command name
    pub command: String,
    /// Bracketed sub-index (`[s]` or `[s,k]`)
    pub sub: Vec<u32>,
    /// Everything after the command and bracket, trimmed
    pub args: &'a str,
}

impl<'a> Request<'a> {
    /// Parse `[address] COMMAND [bracket] args`, returning `None` on malformed input
    pub fn parse(line: &'a str) -> Option<Self> {
        let mut rest = line.trim();
        let mut module = None;
        let mut port = None;

        if rest.starts_with(|c: char| c.is_ascii_digit()) {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            let address = &rest[..end];
            rest = rest[end..].trim_start();

            let mut parts = address.split('/');
            module = Some(parts.next()?.parse().ok()?);
            if let Some(p) = parts.next() {
                port = Some(if p == "*" {
                    PortSelector::All
                } else {
                    PortSelector::One(p.parse().ok()?)
                });
            }
            if parts.next().is_some() {
                return None;
            }
        }

        let end = rest
            .find(|c: char| c.is_whitespace() || c == '[')
            .unwrap_or(rest.len());
        if end == 0 {
            return None;
        }
        let command = rest[..end].to_ascii_uppercase();
        rest = rest[end..].trim_start();

        let mut sub = Vec::new();
        if let Some(inner) = rest.strip_prefix('[') {
            let close = inner.find(']')?;
            for component in inner[..close].split(',') {
                sub.push(component.trim().parse().ok()?);
            }
            rest = inner[close + 1..].trim_start();
        }

        Some(Self {
            module,
            port,
            command,
            sub,
            args: rest.trim_end(),
        })
    }

    /// Whether this is a `?` query
    pub fn is_query(&self) -> bool {
        self.args == "?"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chassis_command() {
        let req = Request::parse("c_logon \"xena\"").unwrap();
        assert_eq!(req.module, None);
        assert_eq!(req.command, "C_LOGON");
        assert_eq!(req.args, "\"xena\"");
        assert!(!req.is_query());
    }

    #[test]
    fn test_parse_stream_query() {
        let req = Request::parse("0/1 ps_tpldid [ 3 ] ?").unwrap();
        assert_eq!(req.module, Some(0));
        assert_eq!(req.port, Some(PortSelector::One(1)));
        assert_eq!(req.command, "PS_TPLDID");
        assert_eq!(req.sub, vec![3]);
        assert!(req.is_query());
    }

    #[test]
    fn test_parse_modifier_and_wildcard() {
        let req = Request::parse("2/* ps_modifier [1,0] 12 0xFFFF0000 INC 1").unwrap();
        assert_eq!(req.port, Some(PortSelector::All));
        assert_eq!(req.sub, vec![1, 0]);
        assert_eq!(req.args, "12 0xFFFF0000 INC 1");
    }

    #[test]
    fn test_parse_no_args() {
        let req = Request::parse("0/0 ps_create [2]").unwrap();
        assert_eq!(req.args, "");
    }

    #[test]
    fn test_parse_malformed() {
        assert!(Request::parse("0/x p_speed ?").is_none());
        assert!(Request::parse("0/1/2 p_speed ?").is_none());
        assert!(Request::parse("0/1 ps_comment [a] ?").is_none());
        assert!(Request::parse("0/1 ps_comment [1 ?").is_none());
        assert!(Request::parse("   ").is_none());
    }
}

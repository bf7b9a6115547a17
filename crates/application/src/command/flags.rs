//! Flag table mapping short and long aliases to canonical options.

/// How a data flag treats its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    /// `-d`, `--data`, `--data-raw`, `--data-binary`, `--data-ascii`
    Raw,
    /// `--data-urlencode`
    UrlEncode,
    /// `--json`
    Json,
}

/// Canonical command option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOption {
    /// `-X`, `--request`
    Request,
    /// `-H`, `--header`
    Header,
    /// Data flags.
    Data(DataKind),
    /// `-F`, `--form`
    Form,
    /// `-u`, `--user`
    User,
    /// `-A`, `--user-agent`
    UserAgent,
    /// `-e`, `--referer`
    Referer,
    /// `-b`, `--cookie`
    Cookie,
    /// `-m`, `--max-time`
    MaxTime,
    /// `--connect-timeout`
    ConnectTimeout,
    /// `--url`
    Url,
    /// `-L`, `--location`
    Location,
    /// `-v`, `--verbose`
    Verbose,
    /// `-k`, `--insecure`
    Insecure,
    /// `-I`, `--head`
    Head,
    /// `-s`, `--silent`
    Silent,
    /// `--compressed`
    Compressed,
    /// `-i`, `--include`
    Include,
    /// `-G`, `--get`
    Get,
}

impl CommandOption {
    /// Returns true if the option consumes a value.
    #[must_use]
    pub const fn takes_value(self) -> bool {
        matches!(
            self,
            Self::Request
                | Self::Header
                | Self::Data(_)
                | Self::Form
                | Self::User
                | Self::UserAgent
                | Self::Referer
                | Self::Cookie
                | Self::MaxTime
                | Self::ConnectTimeout
                | Self::Url
        )
    }

    /// Looks up a single-letter flag.
    #[must_use]
    pub const fn from_short(flag: char) -> Option<Self> {
        Some(match flag {
            'X' => Self::Request,
            'H' => Self::Header,
            'd' => Self::Data(DataKind::Raw),
            'F' => Self::Form,
            'u' => Self::User,
            'A' => Self::UserAgent,
            'e' => Self::Referer,
            'b' => Self::Cookie,
            'm' => Self::MaxTime,
            'L' => Self::Location,
            'v' => Self::Verbose,
            'k' => Self::Insecure,
            'I' => Self::Head,
            's' => Self::Silent,
            'i' => Self::Include,
            'G' => Self::Get,
            _ => return None,
        })
    }

    /// Looks up a long flag name (without the leading dashes).
    #[must_use]
    pub fn from_long(name: &str) -> Option<Self> {
        Some(match name {
            "request" => Self::Request,
            "header" => Self::Header,
            "data" | "data-raw" | "data-binary" | "data-ascii" => Self::Data(DataKind::Raw),
            "data-urlencode" => Self::Data(DataKind::UrlEncode),
            "json" => Self::Data(DataKind::Json),
            "form" | "form-string" => Self::Form,
            "user" => Self::User,
            "user-agent" => Self::UserAgent,
            "referer" => Self::Referer,
            "cookie" => Self::Cookie,
            "max-time" => Self::MaxTime,
            "connect-timeout" => Self::ConnectTimeout,
            "url" => Self::Url,
            "location" => Self::Location,
            "verbose" => Self::Verbose,
            "insecure" => Self::Insecure,
            "head" => Self::Head,
            "silent" => Self::Silent,
            "compressed" => Self::Compressed,
            "include" => Self::Include,
            "get" => Self::Get,
            _ => return None,
        })
    }
}

//! Routing classifier: vulnerability coverage can go to its own group,
//! everything else is general news. Pure text heuristics, compiled once.

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::article::{Article, Category};

/// Strong signals for vulnerability-focused coverage.
const VULNERABILITY_PATTERNS: &[&str] = &[
    r"CVE-\d{4}-\d{4,}",
    r"zero[- ]?day",
    r"0[- ]?day",
    r"\bRCE\b",
    r"remote code execution",
    r"privilege escalation",
    r"buffer overflow",
    r"SQL injection",
    r"\bSQLi\b",
    r"cross[- ]?site scripting",
    r"\bXSS\b",
    r"\bCSRF\b",
    r"cross[- ]?site request forgery",
    r"security patch(?:es)?",
    r"security update(?:s)?",
    r"critical vulnerability",
    r"vulnerability disclosed",
    r"exploit(?:s|ed|able)?",
    r"proof[- ]?of[- ]?concept",
    r"\bPoC\b",
    r"authentication bypass",
    r"security flaw(?:s)?",
    r"security bug(?:s)?",
    r"patch(?:ed|es|ing)? vulnerability",
    r"fix(?:ed|es|ing)? vulnerability",
    r"actively exploited",
    r"in[- ]?the[- ]?wild exploit",
    r"emergency patch",
    r"critical patch",
    r"security advisory",
    r"CVSS score",
    r"attack vector",
    r"denial[- ]?of[- ]?service",
    r"\bDoS\b",
    r"\bDDoS\b",
    r"memory corruption",
    r"heap overflow",
    r"stack overflow",
    r"use[- ]?after[- ]?free",
    r"arbitrary code execution",
    r"local privilege escalation",
    r"\bLPE\b",
    r"sandbox escape",
    r"security bypass",
    r"information disclosure",
    r"unauthorized access",
];

/// Broader industry-news signals, used only to balance the ratio.
const GENERAL_PATTERNS: &[&str] = &[
    r"data breach(?:es)?",
    r"cyber ?attack",
    r"ransomware",
    r"malware",
    r"phishing",
    r"cybersecurity report",
    r"threat actor",
    r"APT\d+",
    r"security research",
    r"security tool",
    r"security framework",
    r"compliance",
    r"\bGDPR\b",
    r"security audit",
    r"penetration test",
    r"bug bounty",
    r"security conference",
    r"security training",
    r"cybercrime",
    r"dark ?web",
    r"acquisition",
    r"security funding",
    r"security policy",
    r"incident response",
    r"threat intelligence",
    r"security operations",
    r"\bSOC\b",
    r"\bSIEM\b",
];

/// Links into these hosts are vulnerability trackers by definition.
const VULNERABILITY_HOSTS: &[&str] = &[
    "nvd.nist.gov",
    "cve.mitre.org",
    "exploit-db.com",
    "packetstormsecurity.com",
    "seclists.org",
    "vuldb.com",
];

/// A headline mentioning any of these routes to vulnerabilities outright.
const TITLE_KEYWORDS: &[&str] = &[
    "vulnerability",
    "exploit",
    "zero-day",
    "0-day",
    "patch",
    "security update",
    "cve",
    "rce",
    "sql injection",
    "xss",
    "buffer overflow",
];

fn vulnerability_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(&format!("(?i){}", VULNERABILITY_PATTERNS.join("|")))
            .expect("vulnerability regex")
    })
}

fn general_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(&format!("(?i){}", GENERAL_PATTERNS.join("|"))).expect("general regex")
    })
}

/// Pick the routing category for an article.
///
/// Precedence: tracker URLs, then explicit CVE mentions, then the
/// pattern-count ratio, then headline keywords. Anything ambiguous stays
/// general; misrouting a vulnerability to the general group is the cheaper
/// mistake.
pub fn categorize(article: &Article) -> Category {
    let url = article.url.to_lowercase();
    if VULNERABILITY_HOSTS.iter().any(|host| url.contains(host)) {
        return Category::Vulnerabilities;
    }

    let summary = article.summary.as_deref().unwrap_or_default();
    if article.title.contains("CVE-") || summary.contains("CVE-") {
        return Category::Vulnerabilities;
    }

    let combined = format!("{} {}", article.title, summary);
    let vuln_matches = vulnerability_re().find_iter(&combined).count();
    let general_matches = general_re().find_iter(&combined).count();
    if vuln_matches > 0 && vuln_matches as f64 >= general_matches as f64 * 1.5 {
        return Category::Vulnerabilities;
    }

    let title = article.title.to_lowercase();
    if TITLE_KEYWORDS.iter().any(|kw| title.contains(kw)) {
        return Category::Vulnerabilities;
    }

    Category::General
}

//! Specialist lookup tools backed by static reference tables.
//!
//! Each tool scans an ordered table of `(keywords, answer)` entries and
//! returns the first entry whose keyword appears in the query as a whole
//! word. The data is a snapshot; anything time-sensitive is left to
//! grounding.

use async_trait::async_trait;
use touchline_core::error::ToolError;
use touchline_core::text::{contains_phrase, normalize};
use touchline_core::tool::{Tool, ToolResult};

struct Entry {
    keywords: &'static [&'static str],
    answer: &'static str,
}

/// A lookup tool over a static table.
pub struct LookupTool {
    name: &'static str,
    description: &'static str,
    entries: &'static [Entry],
    fallback: &'static str,
}

impl LookupTool {
    pub fn premier_league() -> Self {
        Self {
            name: "premier_league_lookup",
            description: "Look up Premier League clubs, players, standings, fixtures, and results.",
            entries: PREMIER_LEAGUE,
            fallback: "I can help with Premier League teams, players, standings, fixtures, and results. What specific information do you need?",
        }
    }

    pub fn championship() -> Self {
        Self {
            name: "championship_lookup",
            description: "Look up Championship clubs, standings, and promotion or relegation rules.",
            entries: CHAMPIONSHIP,
            fallback: "I can help with Championship teams, standings, promotion/relegation, and fixtures. What specific information do you need?",
        }
    }

    pub fn boxing() -> Self {
        Self {
            name: "boxing_lookup",
            description: "Look up boxers, weight divisions, upcoming fights, and British boxing.",
            entries: BOXING,
            fallback: "I can help with boxers, weight divisions, upcoming fights, and British boxing. What specific information do you need?",
        }
    }

    pub fn sports_news() -> Self {
        Self {
            name: "sports_news_lookup",
            description: "Headline sports news for football, boxing, and transfers.",
            entries: SPORTS_NEWS,
            fallback: "Latest sports news: Premier League season starts August 17th, Boxing returns to Wembley in September, Championship playoff final set for May",
        }
    }

    /// Answer `query` from the table.
    pub fn lookup(&self, query: &str) -> &'static str {
        let q = normalize(query);
        self.entries
            .iter()
            .find(|e| e.keywords.iter().any(|k| contains_phrase(&q, k)))
            .map(|e| e.answer)
            .unwrap_or(self.fallback)
    }
}

#[async_trait]
impl Tool for LookupTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look up, e.g. a club, player, or topic"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        Ok(ToolResult::ok(self.lookup(query)))
    }
}

const PREMIER_LEAGUE: &[Entry] = &[
    Entry {
        keywords: &["standings", "table", "position"],
        answer: "Premier League top 5: 1. Arsenal (86 pts), 2. Manchester City (85 pts), 3. Liverpool (82 pts), 4. Aston Villa (68 pts), 5. Tottenham (63 pts)",
    },
    Entry {
        keywords: &["arsenal"],
        answer: "Arsenal FC - Founded 1886, Home: Emirates Stadium, Manager: Mikel Arteta",
    },
    Entry {
        keywords: &["manchester city", "man city"],
        answer: "Manchester City FC - Founded 1880, Home: Etihad Stadium, Manager: Pep Guardiola",
    },
    Entry {
        keywords: &["liverpool"],
        answer: "Liverpool FC - Founded 1892, Home: Anfield, Manager: Arne Slot",
    },
    Entry {
        keywords: &["manchester united", "man utd", "man united"],
        answer: "Manchester United FC - Founded 1878, Home: Old Trafford",
    },
    Entry {
        keywords: &["chelsea"],
        answer: "Chelsea FC - Founded 1905, Home: Stamford Bridge, Manager: Enzo Maresca",
    },
    Entry {
        keywords: &["haaland"],
        answer: "Erling Haaland - Manchester City striker, 2023/24 Golden Boot winner with 27 goals",
    },
    Entry {
        keywords: &["salah"],
        answer: "Mohamed Salah - Liverpool forward, multiple Golden Boot winner",
    },
    Entry {
        keywords: &["kane"],
        answer: "Harry Kane - Bayern Munich striker (formerly Tottenham), England captain, 213 Premier League goals",
    },
    Entry {
        keywords: &["fixtures", "schedule"],
        answer: "Fixture lists change weekly; ask for the latest fixtures to get a live search.",
    },
    Entry {
        keywords: &["premier league"],
        answer: "The Premier League is England's top football division. 20 teams compete, with 3 relegated each season. Season runs August-May.",
    },
];

const CHAMPIONSHIP: &[Entry] = &[
    Entry {
        keywords: &["standings", "table", "position"],
        answer: "Championship top 5: 1. Leicester City (97 pts), 2. Ipswich Town (96 pts), 3. Leeds United (90 pts), 4. Southampton (87 pts), 5. West Brom (72 pts)",
    },
    Entry {
        keywords: &["leicester"],
        answer: "Leicester City FC - Founded 1884, Home: King Power Stadium",
    },
    Entry {
        keywords: &["leeds"],
        answer: "Leeds United FC - Founded 1919, Home: Elland Road, Manager: Daniel Farke",
    },
    Entry {
        keywords: &["southampton"],
        answer: "Southampton FC - Founded 1885, Home: St Mary's Stadium",
    },
    Entry {
        keywords: &["norwich"],
        answer: "Norwich City FC - Founded 1902, Home: Carrow Road",
    },
    Entry {
        keywords: &["promotion", "promoted", "playoff", "playoffs"],
        answer: "Top 2 teams are automatically promoted to the Premier League. Teams 3-6 enter the playoffs for the third promotion spot.",
    },
    Entry {
        keywords: &["relegation", "relegated"],
        answer: "The bottom 3 Championship teams are relegated to League One.",
    },
    Entry {
        keywords: &["championship"],
        answer: "The Championship is England's second tier. 24 teams compete, with 3 promoted and 3 relegated each season.",
    },
];

const BOXING: &[Entry] = &[
    Entry {
        keywords: &["fury"],
        answer: "Tyson Fury - 'The Gypsy King', former WBC heavyweight champion, 34-0-1 before facing Usyk",
    },
    Entry {
        keywords: &["usyk"],
        answer: "Oleksandr Usyk - Heavyweight champion, former undisputed cruiserweight champion",
    },
    Entry {
        keywords: &["joshua", "aj"],
        answer: "Anthony Joshua - Former unified heavyweight champion, Olympic gold medallist (London 2012)",
    },
    Entry {
        keywords: &["bellew"],
        answer: "Tony Bellew - Former WBC cruiserweight champion, retired 2018, 30-3-1 record",
    },
    Entry {
        keywords: &["brook"],
        answer: "Kell Brook - Former IBF welterweight champion, retired 2022, 40-3 record",
    },
    Entry {
        keywords: &["heavyweight"],
        answer: "Heavyweight division: over 200 lbs (cruiserweight limit). Major belts: WBC, WBA, IBF, WBO.",
    },
    Entry {
        keywords: &["welterweight"],
        answer: "Welterweight division: 147 lbs.",
    },
    Entry {
        keywords: &["middleweight"],
        answer: "Middleweight division: 160 lbs.",
    },
    Entry {
        keywords: &["british", "uk"],
        answer: "Top British boxers: Tyson Fury, Anthony Joshua, Chris Eubank Jr, Conor Benn, Leigh Wood, Josh Warrington",
    },
    Entry {
        keywords: &["boxing"],
        answer: "Boxing has 17 weight divisions. Major sanctioning bodies: WBC, WBA, IBF, WBO. An undisputed champion holds all 4 belts.",
    },
];

const SPORTS_NEWS: &[Entry] = &[
    Entry {
        keywords: &["transfer", "transfers", "signing"],
        answer: "Transfer desk: clubs are active in the window; ask about a specific club for the latest confirmed deals.",
    },
    Entry {
        keywords: &["boxing"],
        answer: "Boxing news: the heavyweight division remains the headline act, with British fighters prominent on major cards.",
    },
    Entry {
        keywords: &["football"],
        answer: "Football news: Premier League and Championship clubs dominate the headlines this week.",
    },
];

//! Curated external resources attached to topics the corpus cannot ground.
//!
//! Lookup is by case-insensitive topic-name substring, with a generic
//! fallback list when nothing matches.

use serde::{Deserialize, Serialize};

/// One externally curated learning resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalResource {
    pub title: String,
    pub url: String,
    /// "course" | "book" | "docs" | "video"
    pub resource_type: String,
}

/// (substring, [(title, url, type)]) — first matching row wins.
const RESOURCE_TABLE: &[(&str, &[(&str, &str, &str)])] = &[
    (
        "option",
        &[
            (
                "Options, Futures, and Other Derivatives (Hull) — companion site",
                "https://www-2.rotman.utoronto.ca/~hull/ofod/",
                "book",
            ),
            (
                "Financial Engineering and Risk Management (Columbia)",
                "https://www.coursera.org/specializations/financialengineering",
                "course",
            ),
        ],
    ),
    (
        "stochastic",
        &[
            (
                "MIT OCW 18.S096 — Topics in Mathematics with Applications in Finance",
                "https://ocw.mit.edu/courses/18-s096-topics-in-mathematics-with-applications-in-finance-fall-2013/",
                "course",
            ),
            (
                "Shreve — Stochastic Calculus for Finance lecture notes",
                "https://www.math.cmu.edu/~shreve/",
                "docs",
            ),
        ],
    ),
    (
        "statistic",
        &[
            (
                "Introduction to Statistical Learning",
                "https://www.statlearning.com/",
                "book",
            ),
            (
                "MIT OCW 18.650 — Statistics for Applications",
                "https://ocw.mit.edu/courses/18-650-statistics-for-applications-fall-2016/",
                "course",
            ),
        ],
    ),
    (
        "machine learning",
        &[
            (
                "Machine Learning Specialization (Andrew Ng)",
                "https://www.coursera.org/specializations/machine-learning-introduction",
                "course",
            ),
            (
                "Elements of Statistical Learning",
                "https://hastie.su.domains/ElemStatLearn/",
                "book",
            ),
        ],
    ),
    (
        "python",
        &[
            (
                "Official Python Tutorial",
                "https://docs.python.org/3/tutorial/",
                "docs",
            ),
            (
                "Python for Data Analysis (McKinney)",
                "https://wesmckinney.com/book/",
                "book",
            ),
        ],
    ),
    (
        "sql",
        &[
            ("SQLBolt interactive lessons", "https://sqlbolt.com/", "course"),
            ("PostgreSQL documentation", "https://www.postgresql.org/docs/", "docs"),
        ],
    ),
    (
        "probability",
        &[
            (
                "MIT OCW 6.041 — Probabilistic Systems Analysis",
                "https://ocw.mit.edu/courses/6-041-probabilistic-systems-analysis-and-applied-probability-fall-2010/",
                "course",
            ),
            (
                "Harvard Stat 110 lectures",
                "https://projects.iq.harvard.edu/stat110",
                "video",
            ),
        ],
    ),
    (
        "microstructure",
        &[
            (
                "Trading and Exchanges (Harris) — reading guide",
                "https://global.oup.com/academic/product/trading-and-exchanges-9780195144703",
                "book",
            ),
        ],
    ),
    (
        "time series",
        &[
            (
                "Forecasting: Principles and Practice",
                "https://otexts.com/fpp3/",
                "book",
            ),
        ],
    ),
];

/// Shown when no substring row matches — the user always gets something.
const GENERIC_RESOURCES: &[(&str, &str, &str)] = &[
    ("Coursera topic search", "https://www.coursera.org/search", "course"),
    ("MIT OpenCourseWare", "https://ocw.mit.edu/", "course"),
    ("Khan Academy", "https://www.khanacademy.org/", "video"),
];

/// Returns curated resources for an uncovered topic.
pub fn resources_for_topic(topic_name: &str) -> Vec<ExternalResource> {
    let needle = topic_name.to_lowercase();
    let rows = RESOURCE_TABLE
        .iter()
        .find(|(substr, _)| needle.contains(substr))
        .map(|(_, rows)| *rows)
        .unwrap_or(GENERIC_RESOURCES);

    rows.iter()
        .map(|(title, url, resource_type)| ExternalResource {
            title: (*title).to_string(),
            url: (*url).to_string(),
            resource_type: (*resource_type).to_string(),
        })
        .collect()
}

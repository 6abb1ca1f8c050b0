use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument};

use crate::error::AppError;
use crate::sync::{SyncOutcome, Synchronizer};

pub struct BlueprintTool {
    pub name: &'static str,
    pub min_hours: f64,
    pub max_hours: f64,
}

impl BlueprintTool {
    /// Seeded goal: the midpoint of the planned range.
    pub fn goal_hours(&self) -> f64 {
        (self.min_hours + self.max_hours) / 2.0
    }
}

pub struct BlueprintCategory {
    pub name: &'static str,
    pub tools: &'static [BlueprintTool],
}

const fn tool(name: &'static str, min_hours: f64, max_hours: f64) -> BlueprintTool {
    BlueprintTool {
        name,
        min_hours,
        max_hours,
    }
}

pub const PLANNING_BLUEPRINT: &[BlueprintCategory] = &[
    BlueprintCategory {
        name: "Core Full-Stack Development",
        tools: &[
            tool("HTML", 20.0, 30.0),
            tool("CSS", 20.0, 30.0),
            tool("JavaScript (ES6+)", 60.0, 80.0),
            tool("React", 70.0, 90.0),
            tool("Tailwind CSS", 15.0, 25.0),
            tool("Django", 80.0, 100.0),
            tool("PostgreSQL", 40.0, 50.0),
            tool("FastAPI", 40.0, 60.0),
            tool("Next.js", 40.0, 60.0),
            tool("AWS (S3 + EC2 + Lambda)", 80.0, 100.0),
            tool("GitHub Actions", 25.0, 40.0),
        ],
    },
    BlueprintCategory {
        name: "Data Science & Machine Learning",
        tools: &[
            tool("Pandas", 80.0, 100.0),
            tool("NumPy", 25.0, 35.0),
            tool("SciPy", 15.0, 20.0),
            tool("Matplotlib", 25.0, 35.0),
            tool("Seaborn", 20.0, 25.0),
            tool("Streamlit", 50.0, 70.0),
            tool("scikit-learn", 60.0, 80.0),
            tool("PyTorch", 60.0, 80.0),
            tool("TensorFlow", 60.0, 80.0),
            tool("CUDA (optional)", 20.0, 30.0),
            tool("Apache Airflow", 50.0, 70.0),
            // Already planned under full-stack; skipped as a duplicate on seeding
            tool("PostgreSQL", 40.0, 60.0),
        ],
    },
    BlueprintCategory {
        name: "Excel Automation & Data Handling",
        tools: &[tool("OpenPyXL", 20.0, 30.0), tool("xlwings", 25.0, 40.0)],
    },
    BlueprintCategory {
        name: "Core Automation (Support Layer)",
        tools: &[
            tool("Python (automation scripting)", 50.0, 70.0),
            tool("Cron Jobs + Airflow", 20.0, 30.0),
            tool("Selenium / Playwright", 40.0, 60.0),
            tool("Requests + aiohttp", 25.0, 40.0),
            tool("GitHub Actions (CI/CD automation)", 20.0, 30.0),
        ],
    },
    BlueprintCategory {
        name: "Reliability & Security",
        tools: &[
            tool("pytest (testing)", 30.0, 50.0),
            tool("OAuth 2.0 + Web App Security", 40.0, 60.0),
        ],
    },
    BlueprintCategory {
        name: "Supporting Skills",
        tools: &[
            tool("Git (version control)", 25.0, 40.0),
            tool("REST + GraphQL APIs", 40.0, 60.0),
            tool("Jira + Agile Collaboration", 20.0, 30.0),
        ],
    },
    BlueprintCategory {
        name: "AI & NLP Engineering",
        tools: &[
            tool("OpenAI API + LangChain", 60.0, 80.0),
            tool("HuggingFace Transformers", 50.0, 70.0),
            tool("Pinecone / FAISS (vector DBs)", 30.0, 50.0),
        ],
    },
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapSummary {
    pub categories_added: usize,
    pub categories_skipped: usize,
    pub technologies_added: usize,
    pub technologies_skipped: usize,
}

/// Seeds built-in categories and their technologies through the synchronizer. Entries that
/// already exist are skipped, so running it again only adds what is missing.
#[instrument(skip(sync, blueprint))]
pub async fn seed(
    sync: &Synchronizer,
    blueprint: &[BlueprintCategory],
) -> Result<BootstrapSummary, AppError> {
    let mut summary = BootstrapSummary::default();
    let today = Utc::now().date_naive();

    for category in blueprint {
        match sync.add_category(category.name, false).await? {
            SyncOutcome::Applied { .. } => summary.categories_added += 1,
            _ => summary.categories_skipped += 1,
        }

        for tool in category.tools {
            let outcome = sync
                .add_technology(tool.name, category.name, tool.goal_hours(), today)
                .await?;
            if outcome.is_applied() {
                summary.technologies_added += 1;
            } else {
                summary.technologies_skipped += 1;
            }
        }
    }

    info!(
        categories_added = summary.categories_added,
        categories_skipped = summary.categories_skipped,
        technologies_added = summary.technologies_added,
        technologies_skipped = summary.technologies_skipped,
        "Planning blueprint seeded"
    );
    Ok(summary)
}

pub async fn seed_blueprint(sync: &Synchronizer) -> Result<BootstrapSummary, AppError> {
    seed(sync, PLANNING_BLUEPRINT).await
}

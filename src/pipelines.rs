use anyhow::Result;

use crate::config::Config;

/// One row of `etl pipelines`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStatus {
    pub name: &'static str,
    pub status: &'static str,
    pub ready: bool,
}

/// Whether each pipeline has a config section and the secrets it needs.
pub fn pipeline_statuses(config: &Config) -> Vec<PipelineStatus> {
    let nvd = match &config.nvd {
        Some(nvd) if nvd.resolved_api_key().is_some() => ("OK (api key)", true),
        Some(_) => ("OK (no api key)", true),
        None => ("NOT CONFIGURED", false),
    };

    let spotify = match &config.spotify {
        Some(s) if s.resolved_client_id().is_some() && s.resolved_client_secret().is_some() => {
            ("OK", true)
        }
        Some(_) => ("MISSING CREDENTIALS", false),
        None => ("NOT CONFIGURED", false),
    };

    let sonarqube = match &config.sonarqube {
        Some(s) if s.resolved_token().is_some() => ("OK", true),
        Some(_) => ("OK (anonymous)", true),
        None => ("NOT CONFIGURED", false),
    };

    vec![
        PipelineStatus {
            name: "nvd",
            status: nvd.0,
            ready: nvd.1,
        },
        PipelineStatus {
            name: "spotify",
            status: spotify.0,
            ready: spotify.1,
        },
        PipelineStatus {
            name: "sonarqube",
            status: sonarqube.0,
            ready: sonarqube.1,
        },
    ]
}

pub fn list_pipelines(config: &Config) -> Result<()> {
    println!("{:<12} {:<22} READY", "PIPELINE", "STATUS");
    for p in pipeline_statuses(config) {
        println!("{:<12} {:<22} {}", p.name, p.status, p.ready);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[test]
    fn test_unconfigured_pipelines() {
        let cfg = parse_config("[db]\npath = \"x.sqlite\"\n").unwrap();
        let statuses = pipeline_statuses(&cfg);
        assert_eq!(statuses.len(), 3);
        assert!(statuses.iter().all(|s| !s.ready));
    }

    #[test]
    fn test_configured_secrets_count_as_ready() {
        let cfg = parse_config(
            r#"
[db]
path = "x.sqlite"

[nvd]
api_key = "k"

[spotify]
client_id = "id"
client_secret = "secret"

[sonarqube]
token = "t"
"#,
        )
        .unwrap();
        let statuses = pipeline_statuses(&cfg);
        assert_eq!(statuses[0].status, "OK (api key)");
        assert!(statuses.iter().all(|s| s.ready));
    }
}

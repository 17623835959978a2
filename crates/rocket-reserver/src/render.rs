//! Text rendering for the terminal.

use std::fmt::Write as _;

use crate::alert::Alert;
use crate::detail::TripAction;
use crate::operations::{LaunchDetail, LaunchSummary};

const MISSING: &str = "-";

/// One line per launch: id, site, mission name.
pub fn launch_list(launches: &[LaunchSummary], has_more: bool) -> String {
    let mut out = String::new();
    let id_width = launches
        .iter()
        .map(|launch| launch.id.len())
        .max()
        .unwrap_or(0);
    let site_width = launches
        .iter()
        .map(|launch| launch.site.as_deref().unwrap_or(MISSING).len())
        .max()
        .unwrap_or(0);
    for launch in launches {
        let site = launch.site.as_deref().unwrap_or(MISSING);
        let mission = launch
            .mission
            .as_ref()
            .and_then(|mission| mission.name.as_deref())
            .unwrap_or(MISSING);
        let _ = writeln!(out, "{:>id_width$}  {site:<site_width$}  {mission}", launch.id);
    }
    if launches.is_empty() {
        out.push_str("No launches.\n");
    }
    if has_more {
        out.push_str("More launches available; use --pages or --all to load them.\n");
    }
    out
}

/// Detail page of one launch.
pub fn launch_detail(launch: &LaunchDetail) -> String {
    let mut out = String::new();
    let mission = launch.mission.as_ref();
    let name = mission
        .and_then(|mission| mission.name.as_deref())
        .unwrap_or(MISSING);
    let _ = writeln!(out, "{name} (launch {})", launch.id);
    if let Some(site) = &launch.site {
        let _ = writeln!(out, "Launching from {site}");
    }
    if let Some((rocket, rocket_type)) = launch
        .rocket
        .as_ref()
        .and_then(|rocket| Some((rocket.name.as_deref()?, rocket.rocket_type.as_deref()?)))
    {
        let _ = writeln!(out, "🚀 {rocket} ({rocket_type})");
    }
    if let Some(patch) = mission.and_then(|mission| mission.mission_patch.as_deref()) {
        let _ = writeln!(out, "Mission patch: {patch}");
    }
    let _ = writeln!(
        out,
        "{} [{}]",
        if launch.is_booked { "Booked" } else { "Not booked" },
        TripAction::toggling(launch.is_booked).label()
    );
    out
}

/// `Title: message`, one line per message line.
pub fn alert(alert: &Alert) -> String {
    let mut out = String::new();
    for line in alert.message.lines() {
        let _ = writeln!(out, "{}: {line}", alert.title);
    }
    if alert.message.is_empty() {
        let _ = writeln!(out, "{}", alert.title);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::{Mission, Rocket};

    fn detail(is_booked: bool) -> LaunchDetail {
        LaunchDetail {
            id: "109".to_string(),
            site: Some("CCAFS SLC 40".to_string()),
            mission: Some(Mission {
                name: Some("Starlink-3".to_string()),
                mission_patch: None,
            }),
            rocket: Some(Rocket {
                name: Some("Falcon 9".to_string()),
                rocket_type: Some("FT".to_string()),
            }),
            is_booked,
        }
    }

    #[test]
    fn detail_shows_site_rocket_and_action() {
        let text = launch_detail(&detail(false));
        assert!(text.starts_with("Starlink-3 (launch 109)\n"));
        assert!(text.contains("Launching from CCAFS SLC 40\n"));
        assert!(text.contains("🚀 Falcon 9 (FT)\n"));
        assert!(text.contains("Not booked [Book now!]"));
        assert!(launch_detail(&detail(true)).contains("Booked [Cancel trip]"));
    }

    #[test]
    fn rocket_line_needs_name_and_type() {
        let mut launch = detail(false);
        launch.rocket = Some(Rocket {
            name: Some("Falcon 9".to_string()),
            rocket_type: None,
        });
        assert!(!launch_detail(&launch).contains("🚀"));
    }

    #[test]
    fn list_aligns_columns() {
        let launches = vec![
            LaunchSummary {
                id: "9".to_string(),
                site: Some("KSC LC 39A".to_string()),
                mission: None,
            },
            LaunchSummary {
                id: "10".to_string(),
                site: None,
                mission: Some(Mission {
                    name: Some("CRS-20".to_string()),
                    mission_patch: None,
                }),
            },
        ];
        let text = launch_list(&launches, false);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines, vec![" 9  KSC LC 39A  -", "10  -           CRS-20"]);
    }

    #[test]
    fn multi_line_alerts_repeat_the_title() {
        let text = alert(&Alert::new("GraphQL Error(s)", "a\nb"));
        assert_eq!(text, "GraphQL Error(s): a\nGraphQL Error(s): b\n");
    }
}

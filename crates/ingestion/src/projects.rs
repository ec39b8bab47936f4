//! Project records.

use bidrec_analytics::refresh_project;
use bidrec_core::{Error, Project, ProjectId, Result, Store};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

/// Fields of a new project.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewProject {
    /// Required; surrounding whitespace is dropped.
    pub name: String,
    /// Bid date, used for time-window filters.
    pub project_date: Option<NaiveDate>,
    /// A blank county is stored as none.
    pub county: Option<String>,
    /// Gross square footage; cost per SF needs it.
    pub building_sf: Option<f64>,
    pub notes: Option<String>,
}

/// Changes to a project.
///
/// An absent field is left as it is. For the optional fields `Some(None)`
/// clears the value; in JSON that is an explicit `null`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectUpdate {
    /// New name; a project cannot lose its name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub project_date: Option<Option<NaiveDate>>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub county: Option<Option<String>>,
    /// Setting or clearing it refreshes every package's cost per SF.
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub building_sf: Option<Option<f64>>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub notes: Option<Option<String>>,
}

/// A field that is present, even as `null`, is `Some`.
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn check_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("project name must not be empty"));
    }
    Ok(name.to_string())
}

fn check_sf(sf: Option<f64>) -> Result<Option<f64>> {
    match sf {
        Some(v) if !v.is_finite() || v < 0.0 => Err(Error::validation(format!(
            "building square footage {} must be a non-negative number",
            v
        ))),
        other => Ok(other),
    }
}

/// Create a project.
pub fn create_project(store: &mut Store, new: NewProject) -> Result<ProjectId> {
    let name = check_name(&new.name)?;
    let building_sf = check_sf(new.building_sf)?;

    let id = store.allocate_id();
    store.projects.insert(
        id,
        Project {
            id,
            name: name.clone(),
            project_date: new.project_date,
            county: new.county.filter(|c| !c.trim().is_empty()),
            building_sf,
            notes: new.notes,
        },
    );
    info!(project_id = id, name = %name, "created project");
    Ok(id)
}

/// Apply an update. Changing the square footage refreshes every package's cost per SF.
pub fn update_project(store: &mut Store, id: ProjectId, update: ProjectUpdate) -> Result<()> {
    let name = update.name.as_deref().map(check_name).transpose()?;
    let building_sf = update.building_sf.map(check_sf).transpose()?;

    let project = store.project_mut(id)?;
    if let Some(name) = name {
        project.name = name;
    }
    if let Some(date) = update.project_date {
        project.project_date = date;
    }
    if let Some(county) = update.county {
        project.county = county.filter(|c| !c.trim().is_empty());
    }
    if let Some(notes) = update.notes {
        project.notes = notes;
    }
    let sf_changed = building_sf.map_or(false, |sf| sf != project.building_sf);
    if let (true, Some(sf)) = (sf_changed, building_sf) {
        project.building_sf = sf;
        refresh_project(store, id)?;
    }
    info!(project_id = id, sf_changed, "updated project");
    Ok(())
}

/// Delete a project with everything it owns.
pub fn delete_project(store: &mut Store, id: ProjectId) -> Result<Project> {
    let project = store.delete_project(id)?;
    info!(project_id = id, name = %project.name, "deleted project");
    Ok(project)
}

use super::assignments::remove_matching;
use super::clinics::{clinics_for_location, purge_clinic, refresh_organization};
use super::{
    AuthStore, LOCATION_NAMES, LOCATIONS, ensure_unassigned, key, list_all, lookup_name,
    record_cascade, require, required_name, save,
};
use crate::error::{AuthDbError, AuthDbResult};
use crate::model::{AssignmentFilter, DomainType, Location};
use carebridge_storage::Transaction;
use std::collections::BTreeSet;
use tracing::info;
use uuid::Uuid;

fn location_name_taken<T: Transaction>(tx: &T, name: &str) -> AuthDbResult<()> {
    if lookup_name(tx, LOCATION_NAMES, name)?.is_some() {
        return Err(AuthDbError::bad_request(format!(
            "location name already taken: {name}"
        )));
    }
    Ok(())
}

impl AuthStore {
    pub fn add_location(&self, location: Location) -> AuthDbResult<Location> {
        ensure_unassigned(&location.id, "location")?;
        let name = required_name(&location.name, "location")?.to_string();
        self.write(|tx| {
            location_name_taken(tx, &name)?;
            let location = Location {
                id: Uuid::new_v4(),
                name,
                clinics: Vec::new(),
                ..location
            };
            save(tx, LOCATIONS, &location.id, &location)?;
            tx.put(LOCATION_NAMES, location.name.as_bytes(), key(&location.id).as_bytes())?;
            Ok(location)
        })
    }

    pub fn get_location(&self, id: Uuid) -> AuthDbResult<Location> {
        self.read(|tx| require(tx, LOCATIONS, &id, "location"))
    }

    pub fn find_location_by_name(&self, name: &str) -> AuthDbResult<Location> {
        self.read(|tx| {
            let id = lookup_name(tx, LOCATION_NAMES, name)?
                .ok_or_else(|| AuthDbError::not_found(format!("location {name}")))?;
            require(tx, LOCATIONS, &id, "location")
        })
    }

    pub fn list_locations(&self) -> AuthDbResult<Vec<Location>> {
        self.read(|tx| list_all(tx, LOCATIONS))
    }

    pub fn update_location(&self, location: &Location) -> AuthDbResult<Location> {
        let name = required_name(&location.name, "location")?.to_string();
        self.write(|tx| {
            let existing: Location = require(tx, LOCATIONS, &location.id, "location")?;
            if existing.name != name {
                location_name_taken(tx, &name)?;
                tx.delete(LOCATION_NAMES, existing.name.as_bytes())?;
                tx.put(LOCATION_NAMES, name.as_bytes(), key(&existing.id).as_bytes())?;
            }
            let updated = Location {
                id: existing.id,
                name,
                city: location.city.clone(),
                country: location.country.clone(),
                has_electricity: location.has_electricity,
                has_internet: location.has_internet,
                clinics: existing.clinics,
            };
            save(tx, LOCATIONS, &updated.id, &updated)?;
            Ok(updated)
        })
    }

    /// Removes a location, its clinics, and every assignment scoped to
    /// either. Organizations that owned those clinics get their lists
    /// refreshed.
    pub fn remove_location(&self, id: Uuid) -> AuthDbResult<()> {
        let (clinics, assignments) = self.write_and_reload(|tx| {
            let location: Location = require(tx, LOCATIONS, &id, "location")?;
            let hosted = clinics_for_location(tx, &id)?;
            let mut assignments = 0;
            let mut organizations = BTreeSet::new();
            for clinic in &hosted {
                assignments += purge_clinic(tx, clinic)?;
                organizations.insert(clinic.organization_id);
            }
            assignments += remove_matching(
                tx,
                &AssignmentFilter::new().domain(DomainType::Location, id.to_string()),
            )?;
            tx.delete(LOCATION_NAMES, location.name.as_bytes())?;
            tx.delete(LOCATIONS, key(&id).as_bytes())?;
            for organization_id in &organizations {
                refresh_organization(tx, organization_id)?;
            }
            Ok((hosted.len(), assignments))
        })?;
        record_cascade("clinic", clinics);
        record_cascade("role_assignment", assignments);
        info!(location_id = %id, clinics, assignments, "location removed");
        Ok(())
    }
}

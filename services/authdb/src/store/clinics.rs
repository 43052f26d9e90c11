//! Clinics and the derived clinic lists on their parents.
use super::assignments::remove_matching;
use super::{
    AuthStore, CLINIC_NAMES, CLINICS, LOCATIONS, ORGANIZATIONS, ensure_unassigned, exists,
    id_from_bytes, key, list_all, load, record_cascade, require, required_name, save,
};
use crate::error::{AuthDbError, AuthDbResult};
use crate::model::{AssignmentFilter, Clinic, DomainType, Location, Organization};
use carebridge_storage::{Transaction, WriteTx};
use std::collections::BTreeSet;
use tracing::info;
use uuid::Uuid;

/// `organization.location.name`; the organization comes first so one prefix
/// scan lists an organization's clinics.
fn clinic_name_key(organization_id: &Uuid, location_id: &Uuid, name: &str) -> String {
    format!("{organization_id}.{location_id}.{name}")
}

fn name_key_of(clinic: &Clinic) -> String {
    clinic_name_key(&clinic.organization_id, &clinic.location_id, &clinic.name)
}

pub(crate) fn clinic_ids_for_organization<T: Transaction>(
    tx: &T,
    organization_id: &Uuid,
) -> AuthDbResult<Vec<Uuid>> {
    let prefix = format!("{organization_id}.");
    tx.scan_prefix(CLINIC_NAMES, prefix.as_bytes())?
        .into_iter()
        .map(|(_, value)| id_from_bytes(&value))
        .collect()
}

pub(crate) fn clinics_for_location<T: Transaction>(
    tx: &T,
    location_id: &Uuid,
) -> AuthDbResult<Vec<Clinic>> {
    let mut clinics = list_all::<Clinic, _>(tx, CLINICS)?;
    clinics.retain(|clinic| clinic.location_id == *location_id);
    Ok(clinics)
}

/// Recomputes `Organization::clinics` from clinic records. A missing
/// organization is skipped; it may be the one being removed.
pub(crate) fn refresh_organization(tx: &WriteTx<'_>, organization_id: &Uuid) -> AuthDbResult<()> {
    let Some(mut organization) = load::<Organization, _>(tx, ORGANIZATIONS, organization_id)? else {
        return Ok(());
    };
    let mut clinics = clinic_ids_for_organization(tx, organization_id)?;
    clinics.sort();
    organization.clinics = clinics;
    save(tx, ORGANIZATIONS, organization_id, &organization)
}

/// Location counterpart of [`refresh_organization`].
pub(crate) fn refresh_location(tx: &WriteTx<'_>, location_id: &Uuid) -> AuthDbResult<()> {
    let Some(mut location) = load::<Location, _>(tx, LOCATIONS, location_id)? else {
        return Ok(());
    };
    let mut clinics = clinics_for_location(tx, location_id)?
        .into_iter()
        .map(|clinic| clinic.id)
        .collect::<Vec<_>>();
    clinics.sort();
    location.clinics = clinics;
    save(tx, LOCATIONS, location_id, &location)
}

/// Deletes one clinic record, its name entry and every assignment scoped to
/// it. Parent lists are left for the caller to refresh.
pub(crate) fn purge_clinic(tx: &WriteTx<'_>, clinic: &Clinic) -> AuthDbResult<usize> {
    let removed = remove_matching(
        tx,
        &AssignmentFilter::new().domain(DomainType::Clinic, clinic.id.to_string()),
    )?;
    tx.delete(CLINIC_NAMES, name_key_of(clinic).as_bytes())?;
    tx.delete(CLINICS, key(&clinic.id).as_bytes())?;
    Ok(removed)
}

fn require_parents<T: Transaction>(tx: &T, clinic: &Clinic) -> AuthDbResult<()> {
    if !exists(tx, ORGANIZATIONS, &clinic.organization_id)? {
        return Err(AuthDbError::bad_request(format!(
            "unknown organization {}",
            clinic.organization_id
        )));
    }
    if !exists(tx, LOCATIONS, &clinic.location_id)? {
        return Err(AuthDbError::bad_request(format!(
            "unknown location {}",
            clinic.location_id
        )));
    }
    Ok(())
}

fn clinic_name_taken<T: Transaction>(tx: &T, clinic: &Clinic) -> AuthDbResult<()> {
    if tx.contains(CLINIC_NAMES, name_key_of(clinic).as_bytes())? {
        return Err(AuthDbError::bad_request(format!(
            "clinic {} already exists at this organization and location",
            clinic.name
        )));
    }
    Ok(())
}

impl AuthStore {
    /// Adds a clinic under an existing organization and location and appends
    /// it to both derived lists.
    pub fn add_clinic(&self, clinic: Clinic) -> AuthDbResult<Clinic> {
        ensure_unassigned(&clinic.id, "clinic")?;
        let name = required_name(&clinic.name, "clinic")?.to_string();
        self.write(|tx| {
            let clinic = Clinic {
                id: Uuid::new_v4(),
                name,
                ..clinic
            };
            require_parents(tx, &clinic)?;
            clinic_name_taken(tx, &clinic)?;
            save(tx, CLINICS, &clinic.id, &clinic)?;
            tx.put(CLINIC_NAMES, name_key_of(&clinic).as_bytes(), key(&clinic.id).as_bytes())?;
            refresh_organization(tx, &clinic.organization_id)?;
            refresh_location(tx, &clinic.location_id)?;
            Ok(clinic)
        })
    }

    pub fn get_clinic(&self, id: Uuid) -> AuthDbResult<Clinic> {
        self.read(|tx| require(tx, CLINICS, &id, "clinic"))
    }

    pub fn list_clinics(&self) -> AuthDbResult<Vec<Clinic>> {
        self.read(|tx| list_all(tx, CLINICS))
    }

    pub fn list_clinics_for_organization(&self, organization_id: Uuid) -> AuthDbResult<Vec<Clinic>> {
        self.read(|tx| {
            if !exists(tx, ORGANIZATIONS, &organization_id)? {
                return Err(AuthDbError::not_found(format!(
                    "organization {organization_id}"
                )));
            }
            clinic_ids_for_organization(tx, &organization_id)?
                .iter()
                .map(|id| require(tx, CLINICS, id, "clinic"))
                .collect()
        })
    }

    /// Renames or moves a clinic. Moving refreshes the lists of both the old
    /// and the new parents.
    pub fn update_clinic(&self, clinic: &Clinic) -> AuthDbResult<Clinic> {
        let name = required_name(&clinic.name, "clinic")?.to_string();
        self.write(|tx| {
            let existing: Clinic = require(tx, CLINICS, &clinic.id, "clinic")?;
            let updated = Clinic {
                id: existing.id,
                name,
                organization_id: clinic.organization_id,
                location_id: clinic.location_id,
            };
            require_parents(tx, &updated)?;
            let old_key = name_key_of(&existing);
            let new_key = name_key_of(&updated);
            if old_key != new_key {
                clinic_name_taken(tx, &updated)?;
                tx.delete(CLINIC_NAMES, old_key.as_bytes())?;
                tx.put(CLINIC_NAMES, new_key.as_bytes(), key(&updated.id).as_bytes())?;
            }
            save(tx, CLINICS, &updated.id, &updated)?;

            let organizations = BTreeSet::from([existing.organization_id, updated.organization_id]);
            for organization_id in &organizations {
                refresh_organization(tx, organization_id)?;
            }
            let locations = BTreeSet::from([existing.location_id, updated.location_id]);
            for location_id in &locations {
                refresh_location(tx, location_id)?;
            }
            Ok(updated)
        })
    }

    /// Removes a clinic and the assignments scoped to it.
    pub fn remove_clinic(&self, id: Uuid) -> AuthDbResult<()> {
        let removed = self.write_and_reload(|tx| {
            let clinic: Clinic = require(tx, CLINICS, &id, "clinic")?;
            let removed = purge_clinic(tx, &clinic)?;
            refresh_organization(tx, &clinic.organization_id)?;
            refresh_location(tx, &clinic.location_id)?;
            Ok(removed)
        })?;
        record_cascade("role_assignment", removed);
        info!(clinic_id = %id, assignments = removed, "clinic removed");
        Ok(())
    }
}

use super::assignments::remove_matching;
use super::clinics::{clinic_ids_for_organization, purge_clinic, refresh_location};
use super::{
    AuthStore, CLINICS, ORGANIZATION_NAMES, ORGANIZATIONS, ensure_unassigned, key, list_all,
    lookup_name, record_cascade, require, required_name, save,
};
use crate::error::{AuthDbError, AuthDbResult};
use crate::model::{AssignmentFilter, Clinic, DomainType, Organization};
use carebridge_storage::Transaction;
use std::collections::BTreeSet;
use tracing::info;
use uuid::Uuid;

fn organization_name_taken<T: Transaction>(tx: &T, name: &str) -> AuthDbResult<()> {
    if lookup_name(tx, ORGANIZATION_NAMES, name)?.is_some() {
        return Err(AuthDbError::bad_request(format!(
            "organization name already taken: {name}"
        )));
    }
    Ok(())
}

impl AuthStore {
    pub fn add_organization(&self, organization: Organization) -> AuthDbResult<Organization> {
        ensure_unassigned(&organization.id, "organization")?;
        let name = required_name(&organization.name, "organization")?.to_string();
        self.write(|tx| {
            organization_name_taken(tx, &name)?;
            let organization = Organization {
                id: Uuid::new_v4(),
                name,
                clinics: Vec::new(),
                ..organization
            };
            save(tx, ORGANIZATIONS, &organization.id, &organization)?;
            tx.put(
                ORGANIZATION_NAMES,
                organization.name.as_bytes(),
                key(&organization.id).as_bytes(),
            )?;
            Ok(organization)
        })
    }

    pub fn get_organization(&self, id: Uuid) -> AuthDbResult<Organization> {
        self.read(|tx| require(tx, ORGANIZATIONS, &id, "organization"))
    }

    pub fn find_organization_by_name(&self, name: &str) -> AuthDbResult<Organization> {
        self.read(|tx| {
            let id = lookup_name(tx, ORGANIZATION_NAMES, name)?
                .ok_or_else(|| AuthDbError::not_found(format!("organization {name}")))?;
            require(tx, ORGANIZATIONS, &id, "organization")
        })
    }

    pub fn list_organizations(&self) -> AuthDbResult<Vec<Organization>> {
        self.read(|tx| list_all(tx, ORGANIZATIONS))
    }

    /// Updates name, address and legal status; the clinic list is kept from
    /// the stored record.
    pub fn update_organization(&self, organization: &Organization) -> AuthDbResult<Organization> {
        let name = required_name(&organization.name, "organization")?.to_string();
        self.write(|tx| {
            let existing: Organization =
                require(tx, ORGANIZATIONS, &organization.id, "organization")?;
            if existing.name != name {
                organization_name_taken(tx, &name)?;
                tx.delete(ORGANIZATION_NAMES, existing.name.as_bytes())?;
                tx.put(ORGANIZATION_NAMES, name.as_bytes(), key(&existing.id).as_bytes())?;
            }
            let updated = Organization {
                id: existing.id,
                name,
                address: organization.address.clone(),
                legal_status: organization.legal_status.clone(),
                clinics: existing.clinics,
            };
            save(tx, ORGANIZATIONS, &updated.id, &updated)?;
            Ok(updated)
        })
    }

    /// Removes an organization, its clinics, and every assignment scoped to
    /// either. Locations that hosted those clinics get their lists refreshed.
    pub fn remove_organization(&self, id: Uuid) -> AuthDbResult<()> {
        let (clinics, assignments) = self.write_and_reload(|tx| {
            let organization: Organization = require(tx, ORGANIZATIONS, &id, "organization")?;
            let mut assignments = 0;
            let mut locations = BTreeSet::new();
            let clinic_ids = clinic_ids_for_organization(tx, &id)?;
            for clinic_id in &clinic_ids {
                let clinic: Clinic = require(tx, CLINICS, clinic_id, "clinic")?;
                assignments += purge_clinic(tx, &clinic)?;
                locations.insert(clinic.location_id);
            }
            assignments += remove_matching(
                tx,
                &AssignmentFilter::new().domain(DomainType::Organization, id.to_string()),
            )?;
            tx.delete(ORGANIZATION_NAMES, organization.name.as_bytes())?;
            tx.delete(ORGANIZATIONS, key(&id).as_bytes())?;
            for location_id in &locations {
                refresh_location(tx, location_id)?;
            }
            Ok((clinic_ids.len(), assignments))
        })?;
        record_cascade("clinic", clinics);
        record_cascade("role_assignment", assignments);
        info!(organization_id = %id, clinics, assignments, "organization removed");
        Ok(())
    }
}

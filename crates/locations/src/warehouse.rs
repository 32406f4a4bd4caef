use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocktake_core::{
    Aggregate, AggregateRoot, CompanyId, DomainError, Event, LocationId, OperatorId,
};

/// Closure audit record: who closed the node, and when.
///
/// Presence of a `Closure` means the node is closed; there is no reopen
/// transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Closure {
    pub by: OperatorId,
    pub at: DateTime<Utc>,
}

/// Leaf of the tree: the physical shelf position that gets counted.
///
/// The presence key is a secret attached to the physical slot (e.g. printed
/// inside the rack); knowing it proves the operator is standing in front of
/// the slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: LocationId,
    pub code: String,
    pub presence_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aisle {
    pub id: LocationId,
    pub code: String,
    pub closed: Option<Closure>,
    pub slots: Vec<Slot>,
}

impl Aisle {
    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: LocationId,
    pub code: String,
    pub closed: Option<Closure>,
    pub aisles: Vec<Aisle>,
}

impl Zone {
    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    fn open_aisle_codes(&self) -> Vec<&str> {
        self.aisles
            .iter()
            .filter(|a| !a.is_closed())
            .map(|a| a.code.as_str())
            .collect()
    }
}

/// Aggregate root: Warehouse.
///
/// Parent-owns-child: the whole Zone > Aisle > Slot tree lives inside one
/// aggregate, so closure preconditions (a parent cannot close while any child
/// is open) are checked without cross-aggregate coordination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warehouse {
    id: LocationId,
    company_id: Option<CompanyId>,
    code: String,
    name: String,
    /// Identifier of this warehouse in the external ERP, when mapped.
    external_warehouse_id: Option<String>,
    closed: Option<Closure>,
    zones: Vec<Zone>,
    version: u64,
    created: bool,
}

impl Warehouse {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: LocationId) -> Self {
        Self {
            id,
            company_id: None,
            code: String::new(),
            name: String::new(),
            external_warehouse_id: None,
            closed: None,
            zones: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> LocationId {
        self.id
    }

    pub fn company_id(&self) -> Option<CompanyId> {
        self.company_id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn external_warehouse_id(&self) -> Option<&str> {
        self.external_warehouse_id.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    pub fn closure(&self) -> Option<&Closure> {
        self.closed.as_ref()
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn find_zone(&self, zone_id: LocationId) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id == zone_id)
    }

    pub fn find_aisle(&self, aisle_id: LocationId) -> Option<&Aisle> {
        self.zones
            .iter()
            .flat_map(|z| z.aisles.iter())
            .find(|a| a.id == aisle_id)
    }

    pub fn find_slot(&self, slot_id: LocationId) -> Option<&Slot> {
        self.slots().find(|s| s.id == slot_id)
    }

    /// Owning zone of a slot.
    pub fn zone_of_slot(&self, slot_id: LocationId) -> Option<&Zone> {
        self.zones.iter().find(|z| {
            z.aisles
                .iter()
                .any(|a| a.slots.iter().any(|s| s.id == slot_id))
        })
    }

    /// Owning aisle of a slot.
    pub fn aisle_of_slot(&self, slot_id: LocationId) -> Option<&Aisle> {
        self.zones
            .iter()
            .flat_map(|z| z.aisles.iter())
            .find(|a| a.slots.iter().any(|s| s.id == slot_id))
    }

    /// All slots of the warehouse, tree order.
    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.zones
            .iter()
            .flat_map(|z| z.aisles.iter())
            .flat_map(|a| a.slots.iter())
    }

    /// Verify that a presented presence key matches the slot's secret.
    ///
    /// Deliberately indistinguishable for "unknown slot" and "wrong key": the
    /// caller learns only that presence verification failed.
    pub fn verify_presence(&self, slot_id: LocationId, presence_key: &str) -> Result<(), DomainError> {
        match self.find_slot(slot_id) {
            Some(slot) if slot.presence_key == presence_key => Ok(()),
            _ => Err(DomainError::authorization(format!(
                "presence verification failed for slot {slot_id}"
            ))),
        }
    }
}

impl AggregateRoot for Warehouse {
    type Id = LocationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateWarehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateWarehouse {
    pub company_id: CompanyId,
    pub warehouse_id: LocationId,
    pub code: String,
    pub name: String,
    pub external_warehouse_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddZone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddZone {
    pub warehouse_id: LocationId,
    pub zone_id: LocationId,
    pub code: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddAisle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddAisle {
    pub warehouse_id: LocationId,
    pub zone_id: LocationId,
    pub aisle_id: LocationId,
    pub code: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddSlot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddSlot {
    pub warehouse_id: LocationId,
    pub aisle_id: LocationId,
    pub slot_id: LocationId,
    pub code: String,
    pub presence_key: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CloseAisle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseAisle {
    pub warehouse_id: LocationId,
    pub aisle_id: LocationId,
    pub closed_by: OperatorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CloseZone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseZone {
    pub warehouse_id: LocationId,
    pub zone_id: LocationId,
    pub closed_by: OperatorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CloseWarehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseWarehouse {
    pub warehouse_id: LocationId,
    pub closed_by: OperatorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarehouseCommand {
    CreateWarehouse(CreateWarehouse),
    AddZone(AddZone),
    AddAisle(AddAisle),
    AddSlot(AddSlot),
    CloseAisle(CloseAisle),
    CloseZone(CloseZone),
    CloseWarehouse(CloseWarehouse),
}

/// Event: WarehouseCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseCreated {
    pub company_id: CompanyId,
    pub warehouse_id: LocationId,
    pub code: String,
    pub name: String,
    pub external_warehouse_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ZoneAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneAdded {
    pub warehouse_id: LocationId,
    pub zone_id: LocationId,
    pub code: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AisleAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AisleAdded {
    pub warehouse_id: LocationId,
    pub zone_id: LocationId,
    pub aisle_id: LocationId,
    pub code: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SlotAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAdded {
    pub warehouse_id: LocationId,
    pub aisle_id: LocationId,
    pub slot_id: LocationId,
    pub code: String,
    pub presence_key: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AisleClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AisleClosed {
    pub warehouse_id: LocationId,
    pub aisle_id: LocationId,
    pub closed_by: OperatorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ZoneClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneClosed {
    pub warehouse_id: LocationId,
    pub zone_id: LocationId,
    pub closed_by: OperatorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WarehouseClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseClosed {
    pub warehouse_id: LocationId,
    pub closed_by: OperatorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarehouseEvent {
    WarehouseCreated(WarehouseCreated),
    ZoneAdded(ZoneAdded),
    AisleAdded(AisleAdded),
    SlotAdded(SlotAdded),
    AisleClosed(AisleClosed),
    ZoneClosed(ZoneClosed),
    WarehouseClosed(WarehouseClosed),
}

impl Event for WarehouseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WarehouseEvent::WarehouseCreated(_) => "locations.warehouse.created",
            WarehouseEvent::ZoneAdded(_) => "locations.zone.added",
            WarehouseEvent::AisleAdded(_) => "locations.aisle.added",
            WarehouseEvent::SlotAdded(_) => "locations.slot.added",
            WarehouseEvent::AisleClosed(_) => "locations.aisle.closed",
            WarehouseEvent::ZoneClosed(_) => "locations.zone.closed",
            WarehouseEvent::WarehouseClosed(_) => "locations.warehouse.closed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WarehouseEvent::WarehouseCreated(e) => e.occurred_at,
            WarehouseEvent::ZoneAdded(e) => e.occurred_at,
            WarehouseEvent::AisleAdded(e) => e.occurred_at,
            WarehouseEvent::SlotAdded(e) => e.occurred_at,
            WarehouseEvent::AisleClosed(e) => e.occurred_at,
            WarehouseEvent::ZoneClosed(e) => e.occurred_at,
            WarehouseEvent::WarehouseClosed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Warehouse {
    type Command = WarehouseCommand;
    type Event = WarehouseEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            WarehouseEvent::WarehouseCreated(e) => {
                self.id = e.warehouse_id;
                self.company_id = Some(e.company_id);
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.external_warehouse_id = e.external_warehouse_id.clone();
                self.closed = None;
                self.zones.clear();
                self.created = true;
            }
            WarehouseEvent::ZoneAdded(e) => {
                self.zones.push(Zone {
                    id: e.zone_id,
                    code: e.code.clone(),
                    closed: None,
                    aisles: Vec::new(),
                });
            }
            WarehouseEvent::AisleAdded(e) => {
                if let Some(zone) = self.zones.iter_mut().find(|z| z.id == e.zone_id) {
                    zone.aisles.push(Aisle {
                        id: e.aisle_id,
                        code: e.code.clone(),
                        closed: None,
                        slots: Vec::new(),
                    });
                }
            }
            WarehouseEvent::SlotAdded(e) => {
                if let Some(aisle) = self
                    .zones
                    .iter_mut()
                    .flat_map(|z| z.aisles.iter_mut())
                    .find(|a| a.id == e.aisle_id)
                {
                    aisle.slots.push(Slot {
                        id: e.slot_id,
                        code: e.code.clone(),
                        presence_key: e.presence_key.clone(),
                    });
                }
            }
            WarehouseEvent::AisleClosed(e) => {
                if let Some(aisle) = self
                    .zones
                    .iter_mut()
                    .flat_map(|z| z.aisles.iter_mut())
                    .find(|a| a.id == e.aisle_id)
                {
                    aisle.closed = Some(Closure {
                        by: e.closed_by,
                        at: e.occurred_at,
                    });
                }
            }
            WarehouseEvent::ZoneClosed(e) => {
                if let Some(zone) = self.zones.iter_mut().find(|z| z.id == e.zone_id) {
                    zone.closed = Some(Closure {
                        by: e.closed_by,
                        at: e.occurred_at,
                    });
                }
            }
            WarehouseEvent::WarehouseClosed(e) => {
                self.closed = Some(Closure {
                    by: e.closed_by,
                    at: e.occurred_at,
                });
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            WarehouseCommand::CreateWarehouse(cmd) => self.handle_create(cmd),
            WarehouseCommand::AddZone(cmd) => self.handle_add_zone(cmd),
            WarehouseCommand::AddAisle(cmd) => self.handle_add_aisle(cmd),
            WarehouseCommand::AddSlot(cmd) => self.handle_add_slot(cmd),
            WarehouseCommand::CloseAisle(cmd) => self.handle_close_aisle(cmd),
            WarehouseCommand::CloseZone(cmd) => self.handle_close_zone(cmd),
            WarehouseCommand::CloseWarehouse(cmd) => self.handle_close_warehouse(cmd),
        }
    }
}

impl Warehouse {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn ensure_warehouse_id(&self, warehouse_id: LocationId) -> Result<(), DomainError> {
        if self.id != warehouse_id {
            return Err(DomainError::invariant("warehouse_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateWarehouse) -> Result<Vec<WarehouseEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("warehouse already exists"));
        }
        if cmd.code.trim().is_empty() {
            return Err(DomainError::validation("warehouse code cannot be empty"));
        }

        Ok(vec![WarehouseEvent::WarehouseCreated(WarehouseCreated {
            company_id: cmd.company_id,
            warehouse_id: cmd.warehouse_id,
            code: cmd.code.clone(),
            name: cmd.name.clone(),
            external_warehouse_id: cmd.external_warehouse_id.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_zone(&self, cmd: &AddZone) -> Result<Vec<WarehouseEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse_id(cmd.warehouse_id)?;

        if self.is_closed() {
            return Err(DomainError::invariant("warehouse is closed"));
        }
        if cmd.code.trim().is_empty() {
            return Err(DomainError::validation("zone code cannot be empty"));
        }
        if self.zones.iter().any(|z| z.code == cmd.code) {
            return Err(DomainError::validation(format!(
                "duplicate zone code '{}'",
                cmd.code
            )));
        }

        Ok(vec![WarehouseEvent::ZoneAdded(ZoneAdded {
            warehouse_id: cmd.warehouse_id,
            zone_id: cmd.zone_id,
            code: cmd.code.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_aisle(&self, cmd: &AddAisle) -> Result<Vec<WarehouseEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse_id(cmd.warehouse_id)?;

        let zone = self
            .find_zone(cmd.zone_id)
            .ok_or_else(DomainError::not_found)?;
        if zone.is_closed() {
            return Err(DomainError::invariant("zone is closed"));
        }
        if cmd.code.trim().is_empty() {
            return Err(DomainError::validation("aisle code cannot be empty"));
        }
        if zone.aisles.iter().any(|a| a.code == cmd.code) {
            return Err(DomainError::validation(format!(
                "duplicate aisle code '{}' in zone '{}'",
                cmd.code, zone.code
            )));
        }

        Ok(vec![WarehouseEvent::AisleAdded(AisleAdded {
            warehouse_id: cmd.warehouse_id,
            zone_id: cmd.zone_id,
            aisle_id: cmd.aisle_id,
            code: cmd.code.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_slot(&self, cmd: &AddSlot) -> Result<Vec<WarehouseEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse_id(cmd.warehouse_id)?;

        let aisle = self
            .find_aisle(cmd.aisle_id)
            .ok_or_else(DomainError::not_found)?;
        if aisle.is_closed() {
            return Err(DomainError::invariant("aisle is closed"));
        }
        if cmd.code.trim().is_empty() {
            return Err(DomainError::validation("slot code cannot be empty"));
        }
        if cmd.presence_key.trim().is_empty() {
            return Err(DomainError::validation("presence key cannot be empty"));
        }
        if aisle.slots.iter().any(|s| s.code == cmd.code) {
            return Err(DomainError::validation(format!(
                "duplicate slot code '{}' in aisle '{}'",
                cmd.code, aisle.code
            )));
        }

        Ok(vec![WarehouseEvent::SlotAdded(SlotAdded {
            warehouse_id: cmd.warehouse_id,
            aisle_id: cmd.aisle_id,
            slot_id: cmd.slot_id,
            code: cmd.code.clone(),
            presence_key: cmd.presence_key.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close_aisle(&self, cmd: &CloseAisle) -> Result<Vec<WarehouseEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse_id(cmd.warehouse_id)?;

        let aisle = self
            .find_aisle(cmd.aisle_id)
            .ok_or_else(DomainError::not_found)?;
        if aisle.is_closed() {
            return Err(DomainError::invariant(format!(
                "aisle '{}' is already closed",
                aisle.code
            )));
        }

        Ok(vec![WarehouseEvent::AisleClosed(AisleClosed {
            warehouse_id: cmd.warehouse_id,
            aisle_id: cmd.aisle_id,
            closed_by: cmd.closed_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close_zone(&self, cmd: &CloseZone) -> Result<Vec<WarehouseEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse_id(cmd.warehouse_id)?;

        let zone = self
            .find_zone(cmd.zone_id)
            .ok_or_else(DomainError::not_found)?;
        if zone.is_closed() {
            return Err(DomainError::invariant(format!(
                "zone '{}' is already closed",
                zone.code
            )));
        }

        let open = zone.open_aisle_codes();
        if !open.is_empty() {
            return Err(DomainError::precondition(format!(
                "zone '{}' has open aisles: {}",
                zone.code,
                open.join(", ")
            )));
        }

        Ok(vec![WarehouseEvent::ZoneClosed(ZoneClosed {
            warehouse_id: cmd.warehouse_id,
            zone_id: cmd.zone_id,
            closed_by: cmd.closed_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close_warehouse(
        &self,
        cmd: &CloseWarehouse,
    ) -> Result<Vec<WarehouseEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse_id(cmd.warehouse_id)?;

        if self.is_closed() {
            return Err(DomainError::invariant("warehouse is already closed"));
        }

        let open: Vec<&str> = self
            .zones
            .iter()
            .filter(|z| !z.is_closed())
            .map(|z| z.code.as_str())
            .collect();
        if !open.is_empty() {
            return Err(DomainError::precondition(format!(
                "warehouse '{}' has open zones: {}",
                self.code,
                open.join(", ")
            )));
        }

        Ok(vec![WarehouseEvent::WarehouseClosed(WarehouseClosed {
            warehouse_id: cmd.warehouse_id,
            closed_by: cmd.closed_by,
            occurred_at: cmd.occurred_at,
        })])
    }
}

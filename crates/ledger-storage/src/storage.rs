use std::path::Path;

use ledger_core::error::{LedgerError, StorageError};
use ledger_core::model::{FormulaTree, Joint, Unit, UnitProps};
use ledger_core::types::{Address32, BallId, Level, Mci, UnitId};
use ledger_graph::GraphView;

use crate::keys;
use crate::tables::{
    AaAddressRecord, AaResponseRecord, AaTriggerRecord, HashTreeBallRecord, StoredUnit,
    UnhandledJointRecord,
};

fn ser<T: serde::Serialize>(v: &T) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(v).map_err(StorageError::from)
}

fn de<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    bincode::deserialize(bytes).map_err(StorageError::from)
}

/// The relational tables plus the two KV namespaces of spec.md §6, backed by
/// named `sled::Tree`s (one tree per documented table).
///
/// | tree | mirrors table |
/// |---|---|
/// | `units` | `units`, `unit_authors`, `unit_witnesses`, commissions (kept on the `Unit` body) |
/// | `outputs` | `outputs` |
/// | `parenthoods` / `children` | `parenthoods` |
/// | `balls` / `ball_to_unit` | `balls` |
/// | `hash_tree_balls` | `hash_tree_balls` |
/// | `definitions` | `definitions` |
/// | `definition_changes` | `address_definition_changes` |
/// | `assets` | `assets` |
/// | `data_feeds` | `data_feeds` |
/// | `aa_addresses` | `aa_addresses` |
/// | `aa_triggers` | `aa_triggers` |
/// | `aa_responses` | `aa_responses` |
/// | `aa_state_vars` | `aa_state_vars` |
/// | `unhandled_joints` | `unhandled_joints` |
/// | `dependencies` | `dependencies` |
/// | `known_bad_joints` | `known_bad_joints` |
/// | `kv` | the `j\n` / `df\n` / `dfv\n` / `b\n` KV namespace |
///
/// `asset_attestors`, `attestations`, `op_votes`, and `system_vars` have no
/// query pattern of their own in the spec beyond "persisted"; their rows are
/// kept inline on the owning `Unit`'s message list rather than duplicated
/// into dedicated trees.
pub struct Storage {
    pub(crate) db: sled::Db,
    pub(crate) units: sled::Tree,
    pub(crate) outputs: sled::Tree,
    pub(crate) parenthoods: sled::Tree,
    pub(crate) children: sled::Tree,
    pub(crate) balls: sled::Tree,
    pub(crate) ball_to_unit: sled::Tree,
    pub(crate) hash_tree_balls: sled::Tree,
    pub(crate) definitions: sled::Tree,
    pub(crate) definition_changes: sled::Tree,
    pub(crate) assets: sled::Tree,
    pub(crate) data_feeds: sled::Tree,
    pub(crate) aa_addresses: sled::Tree,
    pub(crate) aa_triggers: sled::Tree,
    pub(crate) aa_responses: sled::Tree,
    pub(crate) aa_state_vars: sled::Tree,
    pub(crate) unhandled_joints: sled::Tree,
    pub(crate) dependencies: sled::Tree,
    pub(crate) known_bad_joints: sled::Tree,
    pub(crate) kv: sled::Tree,
}

impl Storage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let db = sled::open(path)?;
        Ok(Self {
            units: db.open_tree("units")?,
            outputs: db.open_tree("outputs")?,
            parenthoods: db.open_tree("parenthoods")?,
            children: db.open_tree("children")?,
            balls: db.open_tree("balls")?,
            ball_to_unit: db.open_tree("ball_to_unit")?,
            hash_tree_balls: db.open_tree("hash_tree_balls")?,
            definitions: db.open_tree("definitions")?,
            definition_changes: db.open_tree("definition_changes")?,
            assets: db.open_tree("assets")?,
            data_feeds: db.open_tree("data_feeds")?,
            aa_addresses: db.open_tree("aa_addresses")?,
            aa_triggers: db.open_tree("aa_triggers")?,
            aa_responses: db.open_tree("aa_responses")?,
            aa_state_vars: db.open_tree("aa_state_vars")?,
            unhandled_joints: db.open_tree("unhandled_joints")?,
            dependencies: db.open_tree("dependencies")?,
            known_bad_joints: db.open_tree("known_bad_joints")?,
            kv: db.open_tree("kv")?,
            db,
        })
    }

    // ── units / joints ────────────────────────────────────────────────────

    pub fn read_joint(&self, id: &UnitId) -> Result<Option<Joint>, LedgerError> {
        match self.units.get(keys::unit_key(id))? {
            Some(bytes) => {
                let stored: StoredUnit = de(&bytes)?;
                let ball = stored.props.ball.clone();
                let skiplist_balls = match &ball {
                    Some(b) => self.read_hash_tree_ball(b)?.map(|r| r.skiplist_balls),
                    None => None,
                };
                Ok(Some(Joint {
                    unit: stored.unit,
                    ball,
                    skiplist_balls,
                }))
            }
            None => Ok(None),
        }
    }

    pub fn read_unit_props(&self, id: &UnitId) -> Result<Option<UnitProps>, LedgerError> {
        match self.units.get(keys::unit_key(id))? {
            Some(bytes) => Ok(Some(de::<StoredUnit>(&bytes)?.props)),
            None => Ok(None),
        }
    }

    pub fn unit_exists(&self, id: &UnitId) -> Result<bool, LedgerError> {
        Ok(self.units.contains_key(keys::unit_key(id))?)
    }

    pub fn read_unit(&self, id: &UnitId) -> Result<Option<Unit>, LedgerError> {
        match self.units.get(keys::unit_key(id))? {
            Some(bytes) => Ok(Some(de::<StoredUnit>(&bytes)?.unit)),
            None => Ok(None),
        }
    }

    /// Stable units with `main_chain_index` in `from..=to`, ordered by
    /// `(mci, unit_id)`. Backs `ledger-sync`'s hash-tree construction.
    ///
    /// Unindexed: a full linear scan of the `units` tree, filtered in
    /// memory. A production-scale node would maintain a secondary
    /// `mci -> unit_id` index; this is the scoped-down stand-in (see
    /// `DESIGN.md`).
    pub fn units_in_mci_range(&self, from: Mci, to: Mci) -> Result<Vec<StoredUnit>, LedgerError> {
        let mut out = Vec::new();
        for kv in self.units.iter() {
            let (_, bytes) = kv?;
            let stored: StoredUnit = de(&bytes)?;
            if let Some(mci) = stored.props.main_chain_index {
                if stored.props.is_stable && mci >= from && mci <= to {
                    out.push(stored);
                }
            }
        }
        out.sort_by(|a, b| {
            a.props
                .main_chain_index
                .cmp(&b.props.main_chain_index)
                .then_with(|| a.unit.unit_id.cmp(&b.unit.unit_id))
        });
        Ok(out)
    }

    /// Writes (or overwrites) a unit's stored row. Callers (the Writer) are
    /// responsible for the surrounding atomicity discipline described in
    /// `DESIGN.md`.
    pub fn put_stored_unit(&self, stored: &StoredUnit) -> Result<(), LedgerError> {
        self.units
            .insert(keys::unit_key(&stored.unit.unit_id), ser(stored)?)?;
        self.kv.insert(
            keys::kv_joint_key(&stored.unit.unit_id),
            serde_json::to_vec(&stored.unit).map_err(StorageError::from)?,
        )?;
        Ok(())
    }

    // ── parenthoods ───────────────────────────────────────────────────────

    pub fn put_parenthood(&self, child: &UnitId, parent: &UnitId) -> Result<(), LedgerError> {
        self.parenthoods
            .insert(keys::parenthood_key(child, parent), &[])?;
        self.children
            .insert(keys::child_index_key(parent, child), &[])?;
        Ok(())
    }

    pub fn children_of(&self, parent: &UnitId) -> Result<Vec<UnitId>, LedgerError> {
        let prefix = parent.as_bytes().to_vec();
        let mut out = Vec::new();
        for kv in self.children.scan_prefix(prefix) {
            let (k, _) = kv?;
            let mut child_bytes = [0u8; 32];
            child_bytes.copy_from_slice(&k[32..64]);
            out.push(UnitId::from_bytes(child_bytes));
        }
        Ok(out)
    }

    // ── outputs ───────────────────────────────────────────────────────────

    pub fn put_output(
        &self,
        unit: &UnitId,
        msg_index: u32,
        output_index: u32,
        output: &ledger_core::model::Output,
    ) -> Result<(), LedgerError> {
        self.outputs
            .insert(keys::output_key(unit, msg_index, output_index), ser(output)?)?;
        Ok(())
    }

    pub fn read_output(
        &self,
        unit: &UnitId,
        msg_index: u32,
        output_index: u32,
    ) -> Result<Option<ledger_core::model::Output>, LedgerError> {
        match self
            .outputs
            .get(keys::output_key(unit, msg_index, output_index))?
        {
            Some(bytes) => Ok(Some(de(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn mark_output_spent(
        &self,
        unit: &UnitId,
        msg_index: u32,
        output_index: u32,
    ) -> Result<(), LedgerError> {
        if let Some(mut out) = self.read_output(unit, msg_index, output_index)? {
            out.is_spent = true;
            self.put_output(unit, msg_index, output_index, &out)?;
        }
        Ok(())
    }

    // ── balls ─────────────────────────────────────────────────────────────

    pub fn put_ball(&self, unit: &UnitId, ball: &BallId) -> Result<(), LedgerError> {
        self.balls.insert(keys::unit_key(unit), ball.as_bytes())?;
        self.ball_to_unit.insert(ball.as_bytes(), keys::unit_key(unit).to_vec())?;
        self.kv.insert(keys::kv_ball_key(ball), ball.to_string().into_bytes())?;
        Ok(())
    }

    pub fn ball_of(&self, unit: &UnitId) -> Result<Option<BallId>, LedgerError> {
        match self.balls.get(keys::unit_key(unit))? {
            Some(bytes) => {
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                Ok(Some(BallId::from_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    pub fn unit_of_ball(&self, ball: &BallId) -> Result<Option<UnitId>, LedgerError> {
        match self.ball_to_unit.get(ball.as_bytes())? {
            Some(bytes) => {
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                Ok(Some(UnitId::from_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    pub fn put_hash_tree_ball(&self, record: &HashTreeBallRecord) -> Result<(), LedgerError> {
        self.hash_tree_balls
            .insert(record.ball.as_bytes(), ser(record)?)?;
        Ok(())
    }

    pub fn read_hash_tree_ball(
        &self,
        ball: &BallId,
    ) -> Result<Option<HashTreeBallRecord>, LedgerError> {
        match self.hash_tree_balls.get(ball.as_bytes())? {
            Some(bytes) => Ok(Some(de(&bytes)?)),
            None => Ok(None),
        }
    }

    // ── definitions ───────────────────────────────────────────────────────

    pub fn put_definition(&self, chash: &Address32, def: &FormulaTree) -> Result<(), LedgerError> {
        self.definitions.insert(
            chash.as_str().as_bytes(),
            serde_json::to_vec(def).map_err(StorageError::from)?,
        )?;
        Ok(())
    }

    pub fn read_definition(&self, chash: &Address32) -> Result<Option<FormulaTree>, LedgerError> {
        match self.definitions.get(chash.as_str().as_bytes())? {
            Some(bytes) => {
                Ok(Some(serde_json::from_slice(&bytes).map_err(StorageError::from)?))
            }
            None => Ok(None),
        }
    }

    pub fn record_definition_change(
        &self,
        address: &Address32,
        mci: Mci,
        unit: &UnitId,
    ) -> Result<(), LedgerError> {
        self.definition_changes
            .insert(keys::definition_change_key(address, mci, unit), &[])?;
        Ok(())
    }

    /// Selects the definition change with the greatest MCI `<= max_mci`,
    /// tie-broken by `unit_id` ascending — the mandatory determinism rule of
    /// spec.md §4.2.
    pub fn read_definition_by_address(
        &self,
        address: &Address32,
        max_mci: Mci,
    ) -> Result<Option<(UnitId, Mci)>, LedgerError> {
        let prefix = keys::definition_change_address_prefix(address);
        let mut best: Option<(Mci, UnitId)> = None;
        for kv in self.definition_changes.scan_prefix(&prefix) {
            let (k, _) = kv?;
            if k.len() < prefix.len() + 8 + 32 {
                continue;
            }
            let mut mci_bytes = [0u8; 8];
            mci_bytes.copy_from_slice(&k[prefix.len()..prefix.len() + 8]);
            let mci_val = Mci::from_be_bytes(mci_bytes);
            if mci_val > max_mci {
                continue;
            }
            let mut unit_bytes = [0u8; 32];
            unit_bytes.copy_from_slice(&k[prefix.len() + 8..prefix.len() + 40]);
            let unit = UnitId::from_bytes(unit_bytes);
            best = Some(match best {
                None => (mci_val, unit),
                Some((bmci, bunit)) => {
                    if mci_val > bmci || (mci_val == bmci && unit < bunit) {
                        (mci_val, unit)
                    } else {
                        (bmci, bunit)
                    }
                }
            });
        }
        Ok(best.map(|(mci, unit)| (unit, mci)))
    }

    // ── data feeds ────────────────────────────────────────────────────────

    pub fn put_data_feed(
        &self,
        address: &Address32,
        feed_name: &str,
        mci: Mci,
        unit: &UnitId,
        value: &ledger_core::model::DataFeedValue,
    ) -> Result<(), LedgerError> {
        let val_bytes = ser(value)?;
        self.data_feeds
            .insert(keys::data_feed_key(address, feed_name, mci, unit), val_bytes.clone())?;
        let value_str = match value {
            ledger_core::model::DataFeedValue::Number(n) => n.to_string(),
            ledger_core::model::DataFeedValue::Text(s) => s.clone(),
        };
        self.kv
            .insert(keys::kv_data_feed_key(address, feed_name, &value_str, mci), val_bytes.clone())?;
        self.kv
            .insert(keys::kv_data_feed_latest_key(address, feed_name), val_bytes)?;
        Ok(())
    }

    /// Returns `(value, unit, mci)` for the data feed read matching
    /// `min_mci..=max_mci`; when several candidates share the same
    /// `(mci, level)` the caller must break ties by `unit_id` ascending —
    /// this scan already returns candidates ordered `(mci, unit_id)`
    /// ascending so taking the last (or first, per `ifseveral`) is
    /// deterministic.
    pub fn read_data_feed(
        &self,
        address: &Address32,
        feed_name: &str,
        min_mci: Mci,
        max_mci: Mci,
    ) -> Result<Vec<(ledger_core::model::DataFeedValue, UnitId, Mci)>, LedgerError> {
        let prefix = keys::data_feed_prefix(address, feed_name);
        let mut out = Vec::new();
        for kv in self.data_feeds.scan_prefix(&prefix) {
            let (k, v) = kv?;
            if k.len() < prefix.len() + 8 + 32 {
                continue;
            }
            let mut mci_bytes = [0u8; 8];
            mci_bytes.copy_from_slice(&k[prefix.len()..prefix.len() + 8]);
            let mci_val = Mci::from_be_bytes(mci_bytes);
            if mci_val < min_mci || mci_val > max_mci {
                continue;
            }
            let mut unit_bytes = [0u8; 32];
            unit_bytes.copy_from_slice(&k[prefix.len() + 8..prefix.len() + 40]);
            let unit = UnitId::from_bytes(unit_bytes);
            let value: ledger_core::model::DataFeedValue = de(&v)?;
            out.push((value, unit, mci_val));
        }
        out.sort_by(|a, b| a.2.cmp(&b.2).then(a.1.cmp(&b.1)));
        Ok(out)
    }

    // ── AA addresses / triggers / responses / state vars ─────────────────

    pub fn put_aa_address(&self, record: &AaAddressRecord) -> Result<(), LedgerError> {
        self.aa_addresses
            .insert(record.address.as_str().as_bytes(), ser(record)?)?;
        Ok(())
    }

    pub fn read_aa_address(
        &self,
        address: &Address32,
    ) -> Result<Option<AaAddressRecord>, LedgerError> {
        match self.aa_addresses.get(address.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(de(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn is_aa_address(&self, address: &Address32) -> Result<bool, LedgerError> {
        Ok(self.aa_addresses.contains_key(address.as_str().as_bytes())?)
    }

    pub fn enqueue_aa_trigger(
        &self,
        mci: Mci,
        level: u64,
        trigger_unit: &UnitId,
        aa_address: &Address32,
    ) -> Result<(), LedgerError> {
        let record = AaTriggerRecord {
            trigger_unit: trigger_unit.clone(),
            aa_address: aa_address.clone(),
        };
        self.aa_triggers
            .insert(keys::aa_trigger_key(mci, level, trigger_unit, aa_address), ser(&record)?)?;
        Ok(())
    }

    /// Iterates pending AA triggers in `(mci, level, unit_id, aa_address)`
    /// order — the iteration order mandated by spec.md §5.
    pub fn iter_aa_triggers(&self) -> impl Iterator<Item = Result<AaTriggerRecord, LedgerError>> + '_ {
        self.aa_triggers.iter().map(|kv| {
            let (_, v) = kv?;
            de::<AaTriggerRecord>(&v).map_err(LedgerError::from)
        })
    }

    pub fn remove_aa_trigger(
        &self,
        mci: Mci,
        level: u64,
        trigger_unit: &UnitId,
        aa_address: &Address32,
    ) -> Result<(), LedgerError> {
        self.aa_triggers
            .remove(keys::aa_trigger_key(mci, level, trigger_unit, aa_address))?;
        Ok(())
    }

    pub fn put_aa_response(&self, record: &AaResponseRecord) -> Result<(), LedgerError> {
        self.aa_responses
            .insert(keys::unit_key(&record.trigger_unit), ser(record)?)?;
        Ok(())
    }

    pub fn read_aa_state_var(
        &self,
        aa_address: &Address32,
        var_name: &str,
    ) -> Result<Option<serde_json::Value>, LedgerError> {
        match self.aa_state_vars.get(keys::aa_state_var_key(aa_address, var_name))? {
            Some(bytes) => Ok(Some(de(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn write_aa_state_var(
        &self,
        aa_address: &Address32,
        var_name: &str,
        value: &serde_json::Value,
    ) -> Result<(), LedgerError> {
        self.aa_state_vars
            .insert(keys::aa_state_var_key(aa_address, var_name), ser(value)?)?;
        Ok(())
    }

    // ── joint ingress ─────────────────────────────────────────────────────

    pub fn save_unhandled_joint(&self, record: &UnhandledJointRecord) -> Result<(), LedgerError> {
        let unit_id = record.joint.unit.unit_id.clone();
        self.unhandled_joints.insert(keys::unit_key(&unit_id), ser(record)?)?;
        for missing in &record.missing_parents {
            self.dependencies
                .insert(keys::dependency_key(missing, &unit_id), &[])?;
        }
        Ok(())
    }

    pub fn read_unhandled_joint(
        &self,
        unit: &UnitId,
    ) -> Result<Option<UnhandledJointRecord>, LedgerError> {
        match self.unhandled_joints.get(keys::unit_key(unit))? {
            Some(bytes) => Ok(Some(de(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn remove_unhandled_joint(&self, unit: &UnitId) -> Result<(), LedgerError> {
        self.unhandled_joints.remove(keys::unit_key(unit))?;
        Ok(())
    }

    pub fn dependents_of(&self, missing_unit: &UnitId) -> Result<Vec<UnitId>, LedgerError> {
        let prefix = keys::dependency_prefix(missing_unit);
        let mut out = Vec::new();
        for kv in self.dependencies.scan_prefix(&prefix) {
            let (k, _) = kv?;
            let mut dep_bytes = [0u8; 32];
            dep_bytes.copy_from_slice(&k[32..64]);
            out.push(UnitId::from_bytes(dep_bytes));
        }
        Ok(out)
    }

    pub fn remove_dependency(&self, missing_unit: &UnitId, dependent: &UnitId) -> Result<(), LedgerError> {
        self.dependencies
            .remove(keys::dependency_key(missing_unit, dependent))?;
        Ok(())
    }

    pub fn mark_known_bad(&self, unit: &UnitId, reason: &str) -> Result<(), LedgerError> {
        self.known_bad_joints
            .insert(keys::unit_key(unit), reason.as_bytes())?;
        Ok(())
    }

    pub fn is_known_bad(&self, unit: &UnitId) -> Result<bool, LedgerError> {
        Ok(self.known_bad_joints.contains_key(keys::unit_key(unit))?)
    }

    pub fn flush(&self) -> Result<(), LedgerError> {
        self.db.flush()?;
        Ok(())
    }

    /// The one true-atomic transaction boundary: a unit's own row, its
    /// outputs, and the AA triggers it enqueues land together or not at all.
    /// Auxiliary tables (balls, definitions, data feeds, dependencies, ...)
    /// are written with plain sequential `insert` calls by the caller, which
    /// must hold the process-wide write lock for the duration — see
    /// `DESIGN.md`'s transaction-scope note for why that is an acceptable
    /// simplification here.
    pub fn write_unit_atomic(
        &self,
        unit_row: (Vec<u8>, Vec<u8>),
        output_rows: Vec<(Vec<u8>, Vec<u8>)>,
        trigger_rows: Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Result<(), LedgerError> {
        use sled::transaction::{ConflictableTransactionError, Transactional};

        (&self.units, &self.outputs, &self.aa_triggers)
            .transaction(|(units, outputs, aa_triggers)| {
                units.insert(unit_row.0.as_slice(), unit_row.1.as_slice())?;
                for (k, v) in &output_rows {
                    outputs.insert(k.as_slice(), v.as_slice())?;
                }
                for (k, v) in &trigger_rows {
                    aa_triggers.insert(k.as_slice(), v.as_slice())?;
                }
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e| match e {
                sled::transaction::TransactionError::Storage(se) => LedgerError::from(se),
                sled::transaction::TransactionError::Abort(()) => {
                    LedgerError::Storage(StorageError::TransactionAborted(
                        "unit transaction aborted".into(),
                    ))
                }
            })?;
        Ok(())
    }
}

/// A read-only view of written unit metadata, for `ledger_graph`'s
/// algorithms. Only ever consults the durable `units` tree: unstable units
/// must already have been persisted (with provisional `level`/
/// `witnessed_level`) by the time any graph algorithm needs them.
impl GraphView for Storage {
    fn parents_of(&self, unit: &UnitId) -> Option<Vec<UnitId>> {
        self.read_unit(unit).ok().flatten().map(|u| u.parent_units)
    }

    fn level_of(&self, unit: &UnitId) -> Option<Level> {
        self.read_unit_props(unit).ok().flatten().map(|p| p.level)
    }

    fn witnessed_level_of(&self, unit: &UnitId) -> Option<Level> {
        self.read_unit_props(unit).ok().flatten().map(|p| p.witnessed_level)
    }

    fn best_parent_of(&self, unit: &UnitId) -> Option<UnitId> {
        self.read_unit_props(unit).ok().flatten().and_then(|p| p.best_parent_unit)
    }

    fn authors_of(&self, unit: &UnitId) -> Option<Vec<Address32>> {
        self.read_unit(unit)
            .ok()
            .flatten()
            .map(|u| u.authors.into_iter().map(|a| a.address).collect())
    }
}

//! In-memory game world shared by the integration tests.
//!
//! Implements both [`ActionExecutor`] and [`Catalog`] over one mutable world
//! so that action effects show up in later catalog reads, like the real
//! service.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use artifacts_runner::config::{CharacterRole, RunnerConfig};
use artifacts_runner::game::action::FightResult;
use artifacts_runner::game::{
    Action, ActionError, ActionExecutor, ActionResult, BankDetails, Catalog, CharacterState,
    Cooldown, CraftInfo, DropRate, ItemFilter, ItemInfo, InventorySlot, MapTile, MonsterFilter,
    MonsterInfo, Page, ResourceFilter, ResourceInfo, Skill,
};
use artifacts_runner::game::SimpleItem;
use artifacts_runner::store::QueueStore;
use artifacts_runner::worker::{JobQueue, PauseControl, Worker, WorkerDeps};

pub const NAME: &str = "alice";

/// Maximum time any test is allowed to run before we consider it hung.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

type Hook = Box<dyn FnMut(&Action) + Send>;

pub struct WorldState {
    pub character: CharacterState,
    pub bank: BTreeMap<String, u32>,
    pub bank_gold: u64,
    pub bank_slots: u32,
    pub expansion_cost: u64,
    pub items: Vec<ItemInfo>,
    pub resources: Vec<ResourceInfo>,
    pub monsters: Vec<MonsterInfo>,
    pub maps: Vec<MapTile>,
    /// Errors returned, in order, before any action is applied.
    pub script: VecDeque<ActionError>,
    /// Successfully applied actions.
    pub log: Vec<Action>,
}

pub struct FakeWorld {
    pub state: Mutex<WorldState>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started: Mutex<Vec<Instant>>,
    cooldown: Duration,
    hook: Mutex<Option<Hook>>,
}

fn tile(x: i32, y: i32, content_type: &str, code: &str) -> MapTile {
    MapTile {
        x,
        y,
        content_type: content_type.into(),
        content_code: code.into(),
    }
}

fn add(inv: &mut Vec<InventorySlot>, code: &str, quantity: u32) {
    match inv.iter_mut().find(|s| s.code == code) {
        Some(slot) => slot.quantity += quantity,
        None => inv.push(InventorySlot {
            code: code.into(),
            quantity,
        }),
    }
}

fn remove(inv: &mut Vec<InventorySlot>, code: &str, quantity: u32) -> bool {
    let Some(slot) = inv.iter_mut().find(|s| s.code == code) else {
        return false;
    };
    if slot.quantity < quantity {
        return false;
    }
    slot.quantity -= quantity;
    inv.retain(|s| s.quantity > 0);
    true
}

impl WorldState {
    /// Small world: one bank, copper rocks, a mining workshop and chickens.
    pub fn basic() -> Self {
        let character = CharacterState {
            name: NAME.into(),
            level: 5,
            hp: 100,
            inventory_max_items: 100,
            skills: BTreeMap::from([(Skill::Mining, 5)]),
            ..Default::default()
        };
        Self {
            character,
            bank: BTreeMap::new(),
            bank_gold: 0,
            bank_slots: 50,
            expansion_cost: 4500,
            items: vec![
                ItemInfo {
                    code: "copper_ore".into(),
                    level: 1,
                    item_type: "resource".into(),
                    craft: None,
                },
                ItemInfo {
                    code: "copper_bar".into(),
                    level: 1,
                    item_type: "resource".into(),
                    craft: Some(CraftInfo {
                        skill: Skill::Mining,
                        level: 1,
                        items: vec![SimpleItem::new("copper_ore", 10)],
                        quantity: 1,
                    }),
                },
            ],
            resources: vec![ResourceInfo {
                code: "copper_rocks".into(),
                skill: Skill::Mining,
                level: 1,
                drops: vec![DropRate {
                    code: "copper_ore".into(),
                    rate: 1,
                    min_quantity: 1,
                    max_quantity: 1,
                }],
            }],
            monsters: Vec::new(),
            maps: vec![
                tile(4, 1, "bank", "bank"),
                tile(2, 0, "resource", "copper_rocks"),
                tile(1, 5, "workshop", "mining"),
            ],
            script: VecDeque::new(),
            log: Vec::new(),
        }
    }

    fn apply(&mut self, action: &Action) -> Result<Option<FightResult>, ActionError> {
        let inv = &mut self.character.inventory;
        match action {
            Action::Move { x, y } => {
                self.character.x = *x;
                self.character.y = *y;
            }
            Action::Rest => self.character.hp = self.character.stats.max_hp.max(self.character.hp),
            Action::Fight => return Ok(Some(FightResult::Win)),
            Action::Gather => {
                let (x, y) = (self.character.x, self.character.y);
                let code = self
                    .maps
                    .iter()
                    .find(|t| t.x == x && t.y == y && t.content_type == "resource")
                    .and_then(|t| self.resources.iter().find(|r| r.code == t.content_code))
                    .and_then(|r| r.drops.first())
                    .map(|d| d.code.clone())
                    .ok_or_else(|| ActionError::not_found("no resource here"))?;
                if self.character.free_space() == 0 {
                    return Err(ActionError::insufficient("inventory full"));
                }
                add(&mut self.character.inventory, &code, 1);
            }
            Action::Craft { code, quantity } => {
                let craft = self
                    .items
                    .iter()
                    .find(|i| &i.code == code)
                    .and_then(|i| i.craft.clone())
                    .ok_or_else(|| ActionError::not_found("no recipe"))?;
                for ingredient in &craft.items {
                    if !remove(inv, &ingredient.code, ingredient.quantity * quantity) {
                        return Err(ActionError::insufficient("missing ingredients"));
                    }
                }
                add(inv, code, quantity * craft.quantity.max(1));
            }
            Action::Recycle { code, quantity } | Action::DeleteItem { code, quantity } => {
                if !remove(inv, code, *quantity) {
                    return Err(ActionError::insufficient("not held"));
                }
            }
            Action::DepositItem { code, quantity } => {
                if !remove(inv, code, *quantity) {
                    return Err(ActionError::insufficient("not held"));
                }
                *self.bank.entry(code.clone()).or_default() += quantity;
            }
            Action::WithdrawItem { code, quantity } => {
                let banked = self.bank.get(code).copied().unwrap_or(0);
                if banked < *quantity {
                    return Err(ActionError::insufficient("not in bank"));
                }
                if self.character.free_space() < *quantity {
                    return Err(ActionError::insufficient("inventory full"));
                }
                self.bank.insert(code.clone(), banked - quantity);
                self.bank.retain(|_, q| *q > 0);
                add(&mut self.character.inventory, code, *quantity);
            }
            Action::DepositGold { quantity } => {
                if self.character.gold < *quantity {
                    return Err(ActionError::insufficient("not enough gold"));
                }
                self.character.gold -= quantity;
                self.bank_gold += quantity;
            }
            Action::WithdrawGold { quantity } => {
                if self.bank_gold < *quantity {
                    return Err(ActionError::insufficient("not enough gold in bank"));
                }
                self.bank_gold -= quantity;
                self.character.gold += quantity;
            }
            Action::BuyBankExpansion => {
                if self.character.gold < self.expansion_cost {
                    return Err(ActionError::insufficient("not enough gold"));
                }
                self.character.gold -= self.expansion_cost;
                self.bank_slots += 20;
            }
            other => {
                return Err(ActionError::not_found(format!(
                    "{} is not simulated",
                    other.name()
                )));
            }
        }
        Ok(None)
    }
}

impl FakeWorld {
    pub fn new(state: WorldState) -> Arc<Self> {
        Self::with_cooldown(state, Duration::ZERO)
    }

    pub fn with_cooldown(state: WorldState, cooldown: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
            cooldown,
            hook: Mutex::new(None),
        })
    }

    /// Run `hook` after every successfully applied action.
    pub fn on_action(&self, hook: impl FnMut(&Action) + Send + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn script(&self, errors: impl IntoIterator<Item = ActionError>) {
        self.state.lock().unwrap().script.extend(errors);
    }

    /// Executor calls so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Start instants of every executor call.
    pub fn call_starts(&self) -> Vec<Instant> {
        self.started.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Action) -> bool) -> usize {
        self.state.lock().unwrap().log.iter().filter(|a| pred(a)).count()
    }

    pub fn character_state(&self) -> CharacterState {
        self.state.lock().unwrap().character.clone()
    }

    pub fn bank(&self) -> BTreeMap<String, u32> {
        self.state.lock().unwrap().bank.clone()
    }
}

#[async_trait]
impl ActionExecutor for FakeWorld {
    async fn execute(&self, character: &str, action: &Action) -> Result<ActionResult, ActionError> {
        assert_eq!(character, NAME);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.lock().unwrap().push(Instant::now());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        // Give a concurrent caller the chance to overlap.
        tokio::task::yield_now().await;

        let result = {
            let mut state = self.state.lock().unwrap();
            match state.script.pop_front() {
                Some(err) => Err(err),
                None => state.apply(action).map(|fight| {
                    state.log.push(action.clone());
                    ActionResult {
                        character: state.character.clone(),
                        cooldown: Cooldown::new(self.cooldown, action.name()),
                        fight,
                    }
                }),
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if result.is_ok() {
            if let Some(hook) = self.hook.lock().unwrap().as_mut() {
                hook(action);
            }
        }
        result
    }

    async fn character(&self, name: &str) -> Result<CharacterState, ActionError> {
        assert_eq!(name, NAME);
        Ok(self.character_state())
    }
}

fn level_ok(level: u32, min: Option<u32>, max: Option<u32>) -> bool {
    min.is_none_or(|m| level >= m) && max.is_none_or(|m| level <= m)
}

#[async_trait]
impl Catalog for FakeWorld {
    async fn item(&self, code: &str) -> Result<ItemInfo, ActionError> {
        let state = self.state.lock().unwrap();
        state
            .items
            .iter()
            .find(|i| i.code == code)
            .cloned()
            .ok_or_else(|| ActionError::not_found(format!("item {code}")))
    }

    async fn items(&self, filter: &ItemFilter, _page: u32) -> Result<Page<ItemInfo>, ActionError> {
        let state = self.state.lock().unwrap();
        let data = state
            .items
            .iter()
            .filter(|i| level_ok(i.level, filter.min_level, filter.max_level))
            .filter(|i| filter.item_type.as_ref().is_none_or(|t| &i.item_type == t))
            .filter(|i| {
                filter
                    .craft_skill
                    .is_none_or(|s| i.craft.as_ref().is_some_and(|c| c.skill == s))
            })
            .filter(|i| {
                filter.craft_material.as_ref().is_none_or(|m| {
                    i.craft
                        .as_ref()
                        .is_some_and(|c| c.items.iter().any(|x| &x.code == m))
                })
            })
            .cloned()
            .collect();
        Ok(Page::single(data))
    }

    async fn resources(
        &self,
        filter: &ResourceFilter,
        _page: u32,
    ) -> Result<Page<ResourceInfo>, ActionError> {
        let state = self.state.lock().unwrap();
        let data = state
            .resources
            .iter()
            .filter(|r| level_ok(r.level, filter.min_level, filter.max_level))
            .filter(|r| filter.skill.is_none_or(|s| r.skill == s))
            .filter(|r| {
                filter
                    .drop
                    .as_ref()
                    .is_none_or(|d| r.drops.iter().any(|x| &x.code == d))
            })
            .cloned()
            .collect();
        Ok(Page::single(data))
    }

    async fn monster(&self, code: &str) -> Result<MonsterInfo, ActionError> {
        let state = self.state.lock().unwrap();
        state
            .monsters
            .iter()
            .find(|m| m.code == code)
            .cloned()
            .ok_or_else(|| ActionError::not_found(format!("monster {code}")))
    }

    async fn monsters(
        &self,
        filter: &MonsterFilter,
        _page: u32,
    ) -> Result<Page<MonsterInfo>, ActionError> {
        let state = self.state.lock().unwrap();
        let data = state
            .monsters
            .iter()
            .filter(|m| level_ok(m.level, filter.min_level, filter.max_level))
            .cloned()
            .collect();
        Ok(Page::single(data))
    }

    async fn maps(
        &self,
        content_type: &str,
        content_code: Option<&str>,
    ) -> Result<Vec<MapTile>, ActionError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .maps
            .iter()
            .filter(|t| t.content_type == content_type)
            .filter(|t| content_code.is_none_or(|c| t.content_code == c))
            .cloned()
            .collect())
    }

    async fn bank_details(&self) -> Result<BankDetails, ActionError> {
        let state = self.state.lock().unwrap();
        Ok(BankDetails {
            slots: state.bank_slots,
            expansions: 0,
            next_expansion_cost: state.expansion_cost,
            gold: state.bank_gold,
        })
    }

    async fn bank_items(&self, _page: u32) -> Result<Page<SimpleItem>, ActionError> {
        let state = self.state.lock().unwrap();
        let data = state
            .bank
            .iter()
            .map(|(code, quantity)| SimpleItem::new(code, *quantity))
            .collect();
        Ok(Page::single(data))
    }
}

/// Config with short backoffs so retry paths finish quickly.
pub fn fast_config() -> RunnerConfig {
    RunnerConfig {
        retry_base_delay: Duration::from_millis(1),
        ..Default::default()
    }
}

/// Worker deps over `world` with a fresh queue.
pub fn deps(
    world: &Arc<FakeWorld>,
    queue: Arc<JobQueue>,
    store: Option<Arc<dyn QueueStore>>,
    config: RunnerConfig,
) -> WorkerDeps {
    WorkerDeps {
        queue,
        executor: world.clone(),
        catalog: world.clone(),
        store,
        config: Arc::new(config),
        pause: PauseControl::new(),
        role: CharacterRole::Fighter,
    }
}

/// A worker over `world` seeded with the world's current character.
pub fn worker(world: &Arc<FakeWorld>, deps: WorkerDeps) -> Worker {
    Worker::new(world.character_state(), deps)
}

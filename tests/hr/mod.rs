use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use txoutbox::bus::{BusError, EventBus};
use txoutbox::store::InMemoryStore;
use txoutbox::{
    Aggregate, Envelope, EventQueue, EventRegistry, IntegrationEvent, IntegrationEventHandler, ReactionHandlers, Session,
    UnitOfWork,
};

pub use structs::*;

mod structs;

/// Employee aggregate of the hr module.
pub struct Employee {
    pub id: Uuid,
    pub name: String,
    pub role: String,
    events: EventQueue<EmployeeEvent>,
}

impl Employee {
    pub fn hire(name: &str) -> Self {
        let mut employee = Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            role: "engineer".to_string(),
            events: EventQueue::new(),
        };

        employee.raise(EmployeeEvent::Hired {
            id: employee.id,
            name: name.to_string(),
        });

        employee
    }

    /// Rebuilds an employee from its stored snapshot, with nothing to commit.
    pub fn load(id: Uuid, snapshot: EmployeeSnapshot) -> Self {
        Self {
            id,
            name: snapshot.name,
            role: snapshot.role,
            events: EventQueue::new(),
        }
    }

    pub fn promote(&mut self, role: &str) {
        self.role = role.to_string();
        self.raise(EmployeeEvent::Promoted {
            id: self.id,
            role: role.to_string(),
        });
    }

    pub fn rename(&mut self, name: &str) {
        self.name = name.to_string();
        self.raise(EmployeeEvent::Renamed {
            id: self.id,
            name: name.to_string(),
        });
    }

    pub fn snapshot(&self) -> EmployeeSnapshot {
        EmployeeSnapshot {
            name: self.name.clone(),
            role: self.role.clone(),
        }
    }
}

impl Aggregate for Employee {
    type Event = EmployeeEvent;

    fn event_queue(&self) -> &EventQueue<EmployeeEvent> {
        &self.events
    }

    fn event_queue_mut(&mut self) -> &mut EventQueue<EmployeeEvent> {
        &mut self.events
    }
}

fn hired(event: &EmployeeEvent) -> Option<EmployeeHired> {
    match event {
        EmployeeEvent::Hired { id, name } => Some(EmployeeHired {
            employee_id: *id,
            name: name.clone(),
        }),
        _ => None,
    }
}

fn promoted(event: &EmployeeEvent) -> Option<EmployeePromoted> {
    match event {
        EmployeeEvent::Promoted { id, role } => Some(EmployeePromoted {
            employee_id: *id,
            role: role.clone(),
        }),
        _ => None,
    }
}

/// Hires and promotions are published, renames stay internal to the module.
pub fn handlers<S: Session>() -> ReactionHandlers<EmployeeEvent, S> {
    ReactionHandlers::new()
        .add_handler(IntegrationEventHandler::new(hired))
        .add_handler(IntegrationEventHandler::new(promoted))
}

pub fn registry() -> EventRegistry<HrEvent> {
    EventRegistry::new()
        .register::<EmployeeHired>()
        .register::<EmployeePromoted>()
}

/// Hires an employee through a committed unit of work.
pub async fn hire(store: &InMemoryStore, name: &str) -> Employee {
    let mut employee = Employee::hire(name);

    let mut uow = UnitOfWork::new(store.begin(), handlers());
    uow.session_mut()
        .insert("employees", employee.id.to_string(), employee.snapshot())
        .unwrap();
    uow.commit(&mut [&mut employee]).await.unwrap();

    employee
}

/// An [`EventBus`] recording every publish attempt, failing the first `failures` of them.
#[derive(Default)]
pub struct RecordingBus {
    inner: Mutex<RecordingBusState>,
}

#[derive(Default)]
struct RecordingBusState {
    failures: usize,
    attempts: Vec<Envelope<HrEvent>>,
    published: Vec<Envelope<HrEvent>>,
}

impl RecordingBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(failures: usize) -> Arc<Self> {
        let bus = Self::default();
        bus.inner.lock().unwrap().failures = failures;
        Arc::new(bus)
    }

    pub fn attempts(&self) -> Vec<Envelope<HrEvent>> {
        self.inner.lock().unwrap().attempts.clone()
    }

    pub fn published(&self) -> Vec<Envelope<HrEvent>> {
        self.inner.lock().unwrap().published.clone()
    }
}

#[async_trait]
impl EventBus<HrEvent> for RecordingBus {
    async fn publish(&self, envelope: &Envelope<HrEvent>) -> Result<(), BusError> {
        let mut state = self.inner.lock().unwrap();
        state.attempts.push(envelope.clone());

        if state.failures > 0 {
            state.failures -= 1;
            return Err(BusError::Transport("broker unavailable".into()));
        }

        state.published.push(envelope.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

pub fn event_type(event: &HrEvent) -> &'static str {
    match event {
        HrEvent::Hired(_) => EmployeeHired::EVENT_TYPE,
        HrEvent::Promoted(_) => EmployeePromoted::EVENT_TYPE,
    }
}

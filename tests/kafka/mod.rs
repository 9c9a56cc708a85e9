use chrono::Utc;
use uuid::Uuid;

use txoutbox::bus::kafka::{KafkaEventBus, KafkaEventBusConfig};
use txoutbox::bus::EventBus;
use txoutbox::Envelope;

use crate::hr::{EmployeePromoted, HrEvent};

#[tokio::test]
async fn kafka_event_bus_test() {
    let kafka_broker_url: String = std::env::var("KAFKA_BROKERS_URL").unwrap();

    let config: KafkaEventBusConfig = KafkaEventBusConfig::builder()
        .broker_url_list(kafka_broker_url.as_str())
        .topic("hr")
        .build();

    let bus: KafkaEventBus<HrEvent> = match KafkaEventBus::new(config).await {
        Ok(bus) => bus,
        Err(error) => panic!("{:?}", error),
    };

    let envelope: Envelope<HrEvent> = Envelope {
        id: Uuid::new_v4(),
        event_type: "hr.employee_promoted".to_string(),
        occurred_on: Utc::now(),
        attempt: 1,
        payload: HrEvent::Promoted(EmployeePromoted {
            employee_id: Uuid::new_v4(),
            role: "staff engineer".to_string(),
        }),
    };

    bus.publish(&envelope).await.unwrap();
}

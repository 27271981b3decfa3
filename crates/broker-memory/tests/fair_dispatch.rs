//! Competing consumers under a prefetch window of one.

use montecarlo_broker::{
    declare_work_queues, Broker, Channel, MessageProperties, DEFAULT_EXCHANGE,
};
use montecarlo_broker_memory::MemoryBroker;
use montecarlo_types::SCENARIO_QUEUE;
use std::thread;
use std::time::Duration;

const WORKERS: usize = 4;
const MESSAGES: usize = 400;

#[test]
fn test_competing_consumers_share_work_evenly() {
    let broker = MemoryBroker::new();
    let publisher = broker.open_channel().unwrap();
    declare_work_queues(&publisher).unwrap();

    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let channel = broker.open_channel().unwrap();
            thread::spawn(move || {
                channel.set_prefetch(1).unwrap();
                let consumer = channel.consume(SCENARIO_QUEUE).unwrap();
                let mut handled = 0usize;
                while let Ok(delivery) = consumer.recv_timeout(Duration::from_millis(500)) {
                    // Simulated evaluation.
                    thread::sleep(Duration::from_micros(200));
                    channel.ack(delivery.tag).unwrap();
                    handled += 1;
                }
                handled
            })
        })
        .collect();

    // Let every worker subscribe before the stream starts.
    while broker.consumer_count(SCENARIO_QUEUE) < WORKERS {
        thread::sleep(Duration::from_millis(1));
    }
    for i in 0..MESSAGES {
        publisher
            .publish(
                DEFAULT_EXCHANGE,
                SCENARIO_QUEUE,
                i.to_string().into_bytes(),
                MessageProperties::persistent(),
            )
            .unwrap();
    }

    let counts: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(counts.iter().sum::<usize>(), MESSAGES);

    let stats = broker.stats();
    for consumer in stats.consumers_of(SCENARIO_QUEUE) {
        assert_eq!(consumer.peak_unacked, 1, "{} exceeded prefetch", consumer.tag);
    }
    // Bounded skew, not proportional to the message count.
    let skew = stats.delivery_skew(SCENARIO_QUEUE).unwrap();
    assert!(skew <= (MESSAGES / WORKERS / 2) as u64, "skew {skew} for {counts:?}");
    assert_eq!(stats.queue(SCENARIO_QUEUE).acked, MESSAGES as u64);
}

#[test]
fn test_crashed_consumer_work_is_redelivered() {
    let broker = MemoryBroker::new();
    let publisher = broker.open_channel().unwrap();
    declare_work_queues(&publisher).unwrap();
    for i in 0..3 {
        publisher
            .publish(
                DEFAULT_EXCHANGE,
                SCENARIO_QUEUE,
                i.to_string().into_bytes(),
                MessageProperties::persistent(),
            )
            .unwrap();
    }

    let crashing = broker.open_channel().unwrap();
    crashing.set_prefetch(1).unwrap();
    let doomed = crashing.consume(SCENARIO_QUEUE).unwrap();
    let held = doomed.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(&*held.body, b"0");
    drop(doomed);
    drop(crashing);

    let survivor = broker.open_channel().unwrap();
    survivor.set_prefetch(1).unwrap();
    let consumer = survivor.consume(SCENARIO_QUEUE).unwrap();
    let redelivered = consumer.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(&*redelivered.body, b"0");
    assert!(redelivered.redelivered);
    assert_eq!(broker.stats().queue(SCENARIO_QUEUE).redelivered, 1);
}

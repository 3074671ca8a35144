//! RabbitMQ source
//!
//! One connection, one channel, one consumer. On connect the queue is declared
//! durable, the channel prefetch is bounded so the broker cannot run ahead of
//! the hub, and consumption starts in auto-ack mode: a message counts as
//! delivered as soon as it reaches this process.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use futures::stream::{BoxStream, StreamExt};
use lapin::options::{BasicConsumeOptions, BasicQosOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, Consumer};
use tracing::{debug, info};

use super::source::{DeliveryStream, MessageSource};
use crate::client::Payload;
use crate::config::BrokerSettings;
use crate::utils::{FanoutError, Result};

#[derive(Debug, Clone)]
pub struct AmqpSource {
    settings: BrokerSettings,
}

pub struct AmqpDeliveries {
    stream: BoxStream<'static, Result<Payload>>,
    channel: Channel,
    connection: Connection,
}

impl AmqpSource {
    pub fn new(settings: BrokerSettings) -> Self {
        Self { settings }
    }

    async fn start_consumer(&self, channel: &Channel) -> Result<Consumer> {
        let queue = &self.settings.queue;
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .basic_qos(self.settings.prefetch, BasicQosOptions::default())
            .await?;

        let consumer = channel
            .basic_consume(
                queue,
                &self.settings.consumer_tag,
                BasicConsumeOptions {
                    no_ack: true,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(consumer)
    }
}

impl MessageSource for AmqpSource {
    type Deliveries = AmqpDeliveries;

    async fn connect(&self) -> Result<AmqpDeliveries> {
        let connection =
            Connection::connect(&self.settings.uri, ConnectionProperties::default()).await?;

        let setup = async {
            let channel = connection.create_channel().await?;
            let consumer = self.start_consumer(&channel).await?;
            Ok::<_, FanoutError>((channel, consumer))
        };
        let (channel, consumer) = match setup.await {
            Ok(parts) => parts,
            Err(e) => {
                let _ = connection.close(200, "consumer setup failed").await;
                return Err(e);
            }
        };

        info!(
            queue = %self.settings.queue,
            prefetch = self.settings.prefetch,
            "broker consumer started"
        );

        let stream = consumer
            .map(|delivery| {
                delivery
                    .map(|d| Payload::from(d.data))
                    .map_err(FanoutError::from)
            })
            .boxed();

        Ok(AmqpDeliveries {
            stream,
            channel,
            connection,
        })
    }

    fn describe(&self) -> String {
        format!("queue '{}'", self.settings.queue)
    }
}

impl Stream for AmqpDeliveries {
    type Item = Result<Payload>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.poll_next_unpin(cx)
    }
}

impl DeliveryStream for AmqpDeliveries {
    async fn close(self) {
        if let Err(e) = self.channel.close(200, "bye").await {
            debug!("closing broker channel: {e}");
        }
        if let Err(e) = self.connection.close(200, "bye").await {
            debug!("closing broker connection: {e}");
        }
    }
}

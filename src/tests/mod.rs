mod test_cron_schedule;
mod test_durable_queue;
mod test_worker;

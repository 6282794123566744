#[cfg(test)]
mod test_cron_schedule {
    use chrono::{DateTime, TimeZone, Timelike, Utc};
    use crate::cron_schedule::CronSchedule;
    use crate::error::SchedulerError;
    use crate::trigger::Trigger;

    #[test]
    fn test_upcoming() {
        let dt: DateTime<Utc> = Utc::now();
        let result = CronSchedule::new().second("0").minute("*/6").upcoming(Some(dt));
        assert!(result.is_ok(),"{:?}",result.unwrap_err());
        let schedule: Option<DateTime<Utc>> = result.unwrap();
        assert!(schedule.is_some());
        let next_schedule: DateTime<Utc> = schedule.unwrap();
        assert!(next_schedule > dt,"Start DateTime: {:?} | Next Schedule: {:?}",dt,next_schedule);
        assert_eq!(next_schedule.minute() % 6,0);
        assert_eq!(next_schedule.second(),0);
    }

    #[test]
    fn test_expression_and_trigger() {
        let schedule: CronSchedule = CronSchedule::new().second("30").minute("15").hour("9");
        assert_eq!(schedule.expression(),"30 15 9 * * ?");
        let trigger: Trigger = schedule.trigger().unwrap();
        let start: DateTime<Utc> = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        assert_eq!(trigger.next_fire_time(start),Some(Utc.with_ymd_and_hms(2024, 6, 2, 9, 15, 30).unwrap()));
    }

    #[test]
    fn test_invalid_field() {
        let result = CronSchedule::new().hour("25").trigger();
        assert!(matches!(result,Err(SchedulerError::InvalidExpression(_))),"{:?}",result);
    }
}
